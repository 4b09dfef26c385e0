#![no_main]
use libfuzzer_sys::fuzz_target;

use templar_smt::backends::smtlib_printer::to_smtlib;
use templar_smt::smtlib_parser::parse_term;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // The parser must never panic on any input.
        if let Ok(term) = parse_term(s) {
            // Printing is a fixed point after one round trip.
            let printed = to_smtlib(&term);
            if let Ok(again) = parse_term(&printed) {
                assert_eq!(to_smtlib(&again), printed);
            }
        }
    }
});
