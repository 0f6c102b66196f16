mod redaction_tests;
mod scanner_tests;
