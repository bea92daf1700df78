#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a line export: every row is either mapped or counted as failed.
    if let Ok(report) = extrusion_config::import_line_csv_reader(data) {
        assert!(report.imported() + report.failed <= report.total);
    }
});
