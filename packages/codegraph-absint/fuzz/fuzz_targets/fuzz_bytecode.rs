#![no_main]

use codegraph_absint::{run_program, AnalysisConfig, CodeObject, Director, NullImporter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Malformed bytecode must come back as an error, never a panic
    let Ok(code) = serde_json::from_slice::<CodeObject>(data) else {
        return;
    };
    let config = AnalysisConfig::default().max_call_depth(4).solver_step_limit(10_000);
    let _ = run_program(code, &Director::new(), &NullImporter, config);
});
