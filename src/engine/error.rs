use thiserror::Error;

/// Why an engine invocation did not succeed.
///
/// The controller never branches on the variant: every failure feeds the same
/// uniform backoff. The variants exist for the operational log.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {}", describe_code(*.code))]
    Exit { program: String, code: Option<i32> },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (terminated by signal)".to_string(),
    }
}
