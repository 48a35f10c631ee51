use std::io::Write;

use crate::config::DisplayConfig;
use crate::error::RunError;
use crate::report::{BuildEvent, RunSummary};

const GRAY: &str = "\x1b[90m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BOLD_RED: &str = "\x1b[31;1m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Console rendering of build events. Rebuilt names always print; fresh ones
/// only when asked for.
pub struct Logger {
    use_colors: bool,
    show_fresh: bool,
    show_output: bool,
}

impl Logger {
    pub fn new(display: &DisplayConfig, verbose: bool) -> Self {
        Self {
            use_colors: display.color && atty::is(atty::Stream::Stdout),
            show_fresh: display.show_fresh || verbose,
            show_output: display.show_output,
        }
    }

    pub fn plain() -> Self {
        Self {
            use_colors: false,
            show_fresh: false,
            show_output: true,
        }
    }

    pub fn with_fresh(mut self, show_fresh: bool) -> Self {
        self.show_fresh = show_fresh;
        self
    }

    pub fn log_event(&self, event: &BuildEvent) {
        let Some(line) = self.render(event) else {
            return;
        };

        if matches!(event, BuildEvent::Failed { .. }) {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
            let _ = std::io::stdout().flush();
        }
    }

    pub fn render(&self, event: &BuildEvent) -> Option<String> {
        match event {
            BuildEvent::Started { .. } => None,
            BuildEvent::Output { target, line } => {
                if !self.show_output {
                    return None;
                }
                Some(self.paint(GRAY, &format!("  {} | ", target)) + line)
            }
            BuildEvent::Rebuilt { target } => Some(self.paint(GREEN, target)),
            BuildEvent::Fresh { target } => {
                if !self.show_fresh {
                    return None;
                }
                Some(self.paint(GRAY, &format!("{} (fresh)", target)))
            }
            BuildEvent::Failed { error, blocked, .. } => {
                let timestamp = chrono::Local::now().format("%H:%M:%S");
                let (color, label) = if *blocked {
                    (YELLOW, "skipped")
                } else {
                    (RED, "error")
                };
                Some(format!(
                    "{} {}",
                    self.paint(GRAY, &format!("[{}]", timestamp)),
                    self.paint(color, &format!("{}: {}", label, error))
                ))
            }
        }
    }

    pub fn log_summary(&self, summary: &RunSummary) {
        let lines = self.render_summary(summary);
        match summary.verdict() {
            Ok(()) => lines.iter().for_each(|line| println!("{}", line)),
            Err(_) => lines.iter().for_each(|line| eprintln!("{}", line)),
        }
    }

    pub fn render_summary(&self, summary: &RunSummary) -> Vec<String> {
        let mut lines = vec![self.paint(
            CYAN,
            &format!(
                "{} rebuilt, {} fresh, {} failed, {} skipped",
                summary.rebuilt.len(),
                summary.fresh.len(),
                summary.failures.len(),
                summary.blocked.len()
            ),
        )];

        if let Err(err) = summary.verdict() {
            let color = match err {
                RunError::Fatal { .. } => BOLD_RED,
                RunError::Incomplete { .. } => YELLOW,
                RunError::Failed { .. } => RED,
            };
            lines.push(self.paint(color, &err.to_string()));
        }

        lines
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(&DisplayConfig::default(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Failure;

    #[test]
    fn test_fresh_hidden_unless_requested() {
        let event = BuildEvent::Fresh {
            target: "main.c".into(),
        };
        assert_eq!(Logger::plain().render(&event), None);
        assert_eq!(
            Logger::plain().with_fresh(true).render(&event).as_deref(),
            Some("main.c (fresh)")
        );
    }

    #[test]
    fn test_rebuilt_and_output() {
        let logger = Logger::plain();
        let rebuilt = BuildEvent::Rebuilt {
            target: "app".into(),
        };
        assert_eq!(logger.render(&rebuilt).as_deref(), Some("app"));

        let output = BuildEvent::Output {
            target: "app".into(),
            line: "linking".into(),
        };
        assert_eq!(logger.render(&output).as_deref(), Some("  app | linking"));
        assert_eq!(
            logger.render(&BuildEvent::Started {
                target: "app".into()
            }),
            None
        );
    }

    #[test]
    fn test_failure_lines() {
        let logger = Logger::plain();
        let failed = BuildEvent::Failed {
            target: "x".into(),
            error: "x: no rule matched".into(),
            blocked: false,
        };
        let line = logger.render(&failed).unwrap();
        assert!(line.starts_with('['));
        assert!(line.ends_with("error: x: no rule matched"));

        let blocked = BuildEvent::Failed {
            target: "app".into(),
            error: "app: dependency x failed".into(),
            blocked: true,
        };
        assert!(logger
            .render(&blocked)
            .unwrap()
            .ends_with("skipped: app: dependency x failed"));
    }

    #[test]
    fn test_summary_lines() {
        let logger = Logger::plain();
        let summary = RunSummary {
            started: 3,
            in_flight: 0,
            rebuilt: vec!["a".into()],
            fresh: vec!["b".into()],
            failures: vec![Failure {
                target: "c".into(),
                message: "c: no rule matched".into(),
            }],
            ..RunSummary::default()
        };

        let lines = logger.render_summary(&summary);
        assert_eq!(lines[0], "1 rebuilt, 1 fresh, 1 failed, 0 skipped");
        assert_eq!(lines[1], "1 target(s) failed");
    }

    #[test]
    fn test_incomplete_summary() {
        let summary = RunSummary {
            started: 2,
            in_flight: 2,
            ..RunSummary::default()
        };
        let lines = Logger::plain().render_summary(&summary);
        assert!(lines[1].starts_with("uncompleted builds"));
    }
}
