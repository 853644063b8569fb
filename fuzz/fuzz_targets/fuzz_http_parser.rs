#![no_main]

use evhttp::http::parser::{Callbacks, Parser};
use libfuzzer_sys::fuzz_target;

#[derive(Default)]
struct NullCallbacks;

impl Callbacks for NullCallbacks {}

fuzz_target!(|data: &[u8]| {
    let mut parser = Parser::new();
    let mut cb = NullCallbacks;
    let _ = parser.execute(&mut cb, data);
});
