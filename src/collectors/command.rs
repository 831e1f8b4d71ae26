use std::io;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("program {program} not found")]
    NotFound { program: String },
    #[error("permission denied running {program}")]
    PermissionDenied { program: String },
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
}

impl CommandError {
    pub fn category(&self) -> &'static str {
        match self {
            CommandError::NotFound { .. } => "NotFound",
            CommandError::PermissionDenied { .. } => "PermissionDenied",
            CommandError::Spawn { .. } => "SpawnFailed",
        }
    }

    fn from_io(program: &str, err: io::Error) -> Self {
        let program = program.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => CommandError::NotFound { program },
            io::ErrorKind::PermissionDenied => CommandError::PermissionDenied { program },
            _ => CommandError::Spawn {
                program,
                source: err,
            },
        }
    }
}

/// Runs an external diagnostic utility and hands back its text.
///
/// Implementations return standard output when it is non-empty and standard
/// error otherwise. A program that ran but printed nothing yields `Ok("")`;
/// only the inability to start it is an error.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        debug!(program = %program, ?args, "running diagnostic command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| CommandError::from_io(program, err))?;

        let stdout = decode_cmd_stdout(&output.stdout);
        if !stdout.trim().is_empty() {
            return Ok(stdout);
        }
        Ok(decode_cmd_stdout(&output.stderr))
    }
}

/// Runs a PowerShell script with the console switched to UTF-8 so CIM rows
/// come back in a predictable encoding.
pub fn run_powershell(runner: &dyn CommandRunner, script: &str) -> Result<String, CommandError> {
    let wrapped_script = format!(
        "[Console]::OutputEncoding=[System.Text.UTF8Encoding]::new($false); $OutputEncoding=[System.Text.UTF8Encoding]::new($false); {script}"
    );
    runner.run("powershell", &["-NoProfile", "-Command", &wrapped_script])
}

fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }

    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let u16buf: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&u16buf) {
            return s;
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

#[cfg(test)]
pub mod testing {
    use super::{CommandError, CommandRunner};
    use std::cell::RefCell;

    enum Reply {
        Text(String),
        Missing,
    }

    struct Rule {
        program: String,
        needle: String,
        reply: Reply,
    }

    /// Canned command collaborator. A rule matches when the program name is
    /// equal and the space-joined arguments contain the needle; unmatched
    /// calls behave like a missing program.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Vec<Rule>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, program: &str, needle: &str, text: &str) -> Self {
            self.rules.push(Rule {
                program: program.to_string(),
                needle: needle.to_string(),
                reply: Reply::Text(text.to_string()),
            });
            self
        }

        pub fn missing(mut self, program: &str, needle: &str) -> Self {
            self.rules.push(Rule {
                program: program.to_string(),
                needle: needle.to_string(),
                reply: Reply::Missing,
            });
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        pub fn was_called(&self, program: &str) -> bool {
            self.calls
                .borrow()
                .iter()
                .any(|c| c.split(' ').next() == Some(program))
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
            let joined = args.join(" ");
            self.calls.borrow_mut().push(format!("{program} {joined}"));
            let rule = self
                .rules
                .iter()
                .find(|r| r.program == program && joined.contains(&r.needle));
            match rule.map(|r| &r.reply) {
                Some(Reply::Text(text)) => Ok(text.clone()),
                Some(Reply::Missing) | None => Err(CommandError::NotFound {
                    program: program.to_string(),
                }),
            }
        }
    }
}
