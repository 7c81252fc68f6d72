use archon_core::prompt::{Confirm, Decision, parse_answer};
use indicatif::ProgressBar;
use std::io::{self, BufRead, Write};

/// Asks on stderr and reads the answer from stdin. A running spinner is
/// suspended while the question is on screen.
#[derive(Default)]
pub struct TerminalConfirm {
    progress: Option<ProgressBar>,
}

impl TerminalConfirm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, decision: &Decision) -> io::Result<bool> {
        let prompt = || ask(decision, &mut io::stdin().lock(), &mut io::stderr());
        match &self.progress {
            Some(progress) => progress.suspend(prompt),
            None => prompt(),
        }
    }
}

/// Renders `decision` and reads one line. End of input answers no.
pub fn ask(
    decision: &Decision,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<bool> {
    for line in decision.details() {
        writeln!(output, "  {line}")?;
    }
    let hint = if decision.default_answer() { "[Y/n]" } else { "[y/N]" };
    write!(output, "{} {hint} ", decision.question())?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        writeln!(output)?;
        return Ok(false);
    }
    Ok(parse_answer(&line, decision.default_answer()))
}
