use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CommonError {
    #[error("Unable to load toml: {path}")]
    TomlReadError { path: String },

    #[error("Unable to parse toml: {msg}")]
    TomlParseError { msg: String },

    #[error("No test case selected (use one of 2stream, landau, standing)")]
    MissingTestCase,

    #[error("Unknown test case {name:?} (expected one of 2stream, landau, standing)")]
    UnknownTestCase { name: String },

    #[error("Unable to parse time pair {input:?} (expected dt or dt,tmax)")]
    TimePairParseError { input: String },

    #[error("Invalid parameter {name}: {msg}")]
    InvalidParameter { name: &'static str, msg: String },
}
