//! Human-readable error descriptions and structured JSON error formatting.

use extrusion_core::error::{AnalyticsError, BuildError};
use extrusion_store::StoreError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingStore => {
                "What happened: No reading store was provided to the analytics runner.\nLikely causes: The store failed to open or was not wired into the builder.\nHow to fix: Pass --store with a writable JSON-lines file, or omit it to use an in-memory store.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `extrusion self-check`."
            ),
        };
    }

    if let Some(ae) = err.downcast_ref::<AnalyticsError>() {
        return match ae {
            AnalyticsError::Config(msg) => format!(
                "What happened: Configuration could not be loaded ({msg}).\nLikely causes: Wrong --config path, TOML syntax error, or a value outside its allowed range.\nHow to fix: Fix the file and run `extrusion self-check` to confirm."
            ),
            AnalyticsError::InvalidBatch(msg) => format!(
                "What happened: The input is not a batch of readings ({msg}).\nLikely causes: The file is truncated or holds a single object instead of an array.\nHow to fix: Provide a JSON array, one JSON document per line, or a line export CSV."
            ),
            AnalyticsError::Persistence(msg) => format!(
                "What happened: Annotated records could not be written back ({msg}).\nLikely causes: The store file is read-only or the disk is full.\nHow to fix: Check permissions and free space, or rerun without --persist."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<StoreError>() {
        return match se {
            StoreError::Io { path, source } => format!(
                "What happened: Could not access {} ({source}).\nLikely causes: Wrong path or missing permissions.\nHow to fix: Check the path passed on the command line.",
                path.display()
            ),
            StoreError::Decode { path, line, source } => format!(
                "What happened: {}:{line} is not a valid record ({source}).\nLikely causes: The file was edited by hand or written by another tool.\nHow to fix: Repair or remove the offending entry.",
                path.display()
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from the CSV importer
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("must have a 'datum' column") {
        return "Invalid headers in line export CSV. Expected a 'Datum' column.".to_string();
    }

    if lower.contains("open line export csv") || lower.contains("read input") {
        return format!(
            "What happened: The input file could not be read.\nLikely causes: Wrong --input path or missing permissions.\nHow to fix: Check the path and rerun. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name of the failure, used as `reason` in JSON errors.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingStore => "MissingStore",
            BuildError::InvalidConfig(_) => "InvalidConfig",
        };
    }
    if let Some(ae) = err.downcast_ref::<AnalyticsError>() {
        return match ae {
            AnalyticsError::InvalidBatch(_) => "InvalidBatch",
            AnalyticsError::MalformedReading(_) => "MalformedReading",
            AnalyticsError::NumericFault { .. } => "NumericFault",
            AnalyticsError::InvalidPath { .. } => "InvalidPath",
            AnalyticsError::History(_) => "History",
            AnalyticsError::Persistence(_) => "Persistence",
            AnalyticsError::Config(_) => "InvalidConfig",
        };
    }
    if err.downcast_ref::<StoreError>().is_some() {
        return "Store";
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("line export csv") || lower.contains("read input") {
        return "Input";
    }
    "Error"
}

/// 3 for configuration problems, 4 for unreadable input or store failures,
/// 1 otherwise. Usage errors exit with 2 from clap itself.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match reason_name(err) {
        "InvalidConfig" | "InvalidPath" => 3,
        "InvalidBatch" | "MalformedReading" | "Persistence" | "History" | "Store" | "Input" => 4,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
