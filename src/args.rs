//! Command-line argument parsing and processing.
//!
//! Hand-rolled parsing over a small, stable flag set. Unknown options
//! fall through to help with an error exit code rather than guessing.

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon with these settings.
    Run(RunOptions),
    /// Take a single photo and exit (`--capture`).
    CaptureOnce {
        debug_enabled: bool,
        config_dir: Option<String>,
    },
    /// Display help information and exit.
    ShowHelp,
    /// Display version information and exit.
    ShowVersion,
    /// Show help due to unknown arguments and exit with failure.
    ShowHelpDueToError,
}

#[derive(Debug, Default, PartialEq)]
pub struct RunOptions {
    pub debug_enabled: bool,
    pub config_dir: Option<String>,
    /// `--test`: fixed capture count at a short interval, no sun logic.
    pub test_mode: bool,
    /// `--no-video`: skip video assembly after test mode.
    pub skip_video: bool,
    /// `--web`: force the web interface on.
    pub web_enabled: bool,
    /// `--web-port`: override the configured port.
    pub web_port: Option<u16>,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    pub fn from_env() -> Self {
        Self::parse(std::env::args())
    }

    /// Parse arguments into a structured action.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        // Help and version take precedence over everything else.
        if args_vec.iter().any(|a| a == "--help" || a == "-h") {
            return ParsedArgs {
                action: CliAction::ShowHelp,
            };
        }
        if args_vec.iter().any(|a| a == "--version" || a == "-V") {
            return ParsedArgs {
                action: CliAction::ShowVersion,
            };
        }

        let mut options = RunOptions::default();
        let mut capture_once = false;

        let mut idx = 0;
        while idx < args_vec.len() {
            match args_vec[idx].as_str() {
                "--debug" | "-d" => options.debug_enabled = true,
                "--test" | "-t" => options.test_mode = true,
                "--no-video" => options.skip_video = true,
                "--capture" => capture_once = true,
                "--web" | "-w" => options.web_enabled = true,
                "--web-port" => {
                    idx += 1;
                    let Some(value) = args_vec.get(idx) else {
                        log_error!("--web-port requires a port number");
                        return ParsedArgs {
                            action: CliAction::ShowHelpDueToError,
                        };
                    };
                    match value.parse::<u16>() {
                        Ok(port) if port > 0 => {
                            options.web_enabled = true;
                            options.web_port = Some(port);
                        }
                        _ => {
                            log_error!("Invalid port '{value}'");
                            return ParsedArgs {
                                action: CliAction::ShowHelpDueToError,
                            };
                        }
                    }
                }
                "--config" | "-c" => {
                    idx += 1;
                    let Some(dir) = args_vec.get(idx) else {
                        log_error!("--config requires a directory");
                        return ParsedArgs {
                            action: CliAction::ShowHelpDueToError,
                        };
                    };
                    options.config_dir = Some(dir.clone());
                }
                unknown => {
                    log_error!("Unknown argument '{unknown}'");
                    return ParsedArgs {
                        action: CliAction::ShowHelpDueToError,
                    };
                }
            }
            idx += 1;
        }

        let action = if capture_once {
            CliAction::CaptureOnce {
                debug_enabled: options.debug_enabled,
                config_dir: options.config_dir,
            }
        } else {
            CliAction::Run(options)
        };

        ParsedArgs { action }
    }
}

/// Display help information.
pub fn display_help() {
    println!("heliocam v{}", env!("CARGO_PKG_VERSION"));
    println!("Sun-scheduled timelapse camera daemon\n");
    println!("Usage: heliocam [OPTIONS]\n");
    println!("Options:");
    println!("  -t, --test            Capture a fixed test series and exit");
    println!("      --no-video        Skip video assembly after a test run");
    println!("      --capture         Take one photo now and exit");
    println!("  -w, --web             Enable the web interface");
    println!("      --web-port <N>    Web interface port (implies --web)");
    println!("  -c, --config <DIR>    Use an alternate config directory");
    println!("  -d, --debug           Enable debug logging");
    println!("  -h, --help            Show this help");
    println!("  -V, --version         Show version");
}

/// Display version information.
pub fn display_version_info() {
    println!("heliocam v{}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliAction {
        crate::logger::Log::set_enabled(false);
        let mut full = vec!["heliocam"];
        full.extend_from_slice(args);
        ParsedArgs::parse(full).action
    }

    #[test]
    fn no_args_runs_with_defaults() {
        assert_eq!(parse(&[]), CliAction::Run(RunOptions::default()));
    }

    #[test]
    fn test_mode_with_no_video() {
        match parse(&["--test", "--no-video"]) {
            CliAction::Run(options) => {
                assert!(options.test_mode);
                assert!(options.skip_video);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn web_port_implies_web() {
        match parse(&["--web-port", "9000"]) {
            CliAction::Run(options) => {
                assert!(options.web_enabled);
                assert_eq!(options.web_port, Some(9000));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn capture_flag_short_circuits_to_one_shot() {
        assert_eq!(
            parse(&["--capture", "--debug"]),
            CliAction::CaptureOnce {
                debug_enabled: true,
                config_dir: None
            }
        );
    }

    #[test]
    fn help_takes_precedence() {
        assert_eq!(parse(&["--test", "--help"]), CliAction::ShowHelp);
    }

    #[test]
    fn unknown_argument_shows_help_with_error() {
        assert_eq!(parse(&["--frobnicate"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert_eq!(
            parse(&["--web-port", "notaport"]),
            CliAction::ShowHelpDueToError
        );
    }

    #[test]
    fn config_dir_is_captured() {
        match parse(&["--config", "/etc/heliocam"]) {
            CliAction::Run(options) => {
                assert_eq!(options.config_dir.as_deref(), Some("/etc/heliocam"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
