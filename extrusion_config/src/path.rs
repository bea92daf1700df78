//! Field path syntax shared by config validation and the analytics core.
//!
//! A path is dot-separated keys, each optionally followed by `[n]` indexes:
//! `materials.extruder_A[2].actual_ratio`, `grid[1][0]`.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Split `s` into segments, or say what is wrong with it.
pub fn parse_field_path(s: &str) -> Result<Vec<PathSegment>, &'static str> {
    if s.is_empty() {
        return Err("empty path");
    }
    let mut segments = Vec::new();
    for part in s.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if name.is_empty() {
            return Err("empty key segment");
        }
        segments.push(PathSegment::Key(name.to_string()));
        while !rest.is_empty() {
            let (idx, tail) = rest
                .strip_prefix('[')
                .and_then(|r| r.split_once(']'))
                .ok_or("unbalanced index brackets")?;
            let idx = idx
                .parse::<usize>()
                .map_err(|_| "index is not a non-negative integer")?;
            segments.push(PathSegment::Index(idx));
            rest = tail;
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_paths() {
        assert_eq!(
            parse_field_path("materials.extruder_A[2].actual_ratio").unwrap(),
            vec![
                PathSegment::Key("materials".into()),
                PathSegment::Key("extruder_A".into()),
                PathSegment::Index(2),
                PathSegment::Key("actual_ratio".into()),
            ]
        );
        assert_eq!(parse_field_path("grid[1][0]").unwrap().len(), 3);
        assert!(parse_field_path("total_output").is_ok());
    }

    #[test]
    fn rejected_paths_name_the_problem() {
        assert_eq!(parse_field_path(""), Err("empty path"));
        assert_eq!(parse_field_path("a..b"), Err("empty key segment"));
        assert_eq!(parse_field_path("[0]"), Err("empty key segment"));
        assert_eq!(parse_field_path("a[1"), Err("unbalanced index brackets"));
        assert_eq!(parse_field_path("a[1]x"), Err("unbalanced index brackets"));
        assert_eq!(parse_field_path("a[x]"), Err("index is not a non-negative integer"));
        assert_eq!(parse_field_path("a[-1]"), Err("index is not a non-negative integer"));
    }
}
