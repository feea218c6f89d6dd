//! Unified logging and progress UI.
//!
//! [`Notifier`] wraps `env_logger` (text logs) and `indicatif` (spinner) under a single
//! verbosity switch:
//! - [`VerbosityLevel::Quiet`] → no text logs; shows a live spinner while work is running.
//! - [`VerbosityLevel::Info`]/[`VerbosityLevel::Debug`]/[`VerbosityLevel::Trace`] → standard logs.
//!
//! [`Notifier::entries`] reports how many archive members have been decoded so far: it
//! updates the spinner in Quiet mode and emits a periodic debug line otherwise.

use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Record};
use std::cell::RefCell;
use std::time::Duration;

const ENTRY_REPORT_INTERVAL: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityLevel {
    Quiet = 0, // Spinner, no text logs
    Info = 1,  // Text logs at info level
    Debug = 2, // Text logs at debug level
    Trace = 3, // Text logs at trace level
}

impl From<u8> for VerbosityLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }
}

impl VerbosityLevel {
    pub fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    logger: env_logger::Logger,
    spinner: RefCell<Option<ProgressBar>>,
}

impl Notifier {
    pub fn new(verbosity_level: u8) -> Self {
        let verbosity = VerbosityLevel::from(verbosity_level);

        let logger = env_logger::Builder::from_env(Env::default())
            .filter_level(verbosity.to_log_level())
            .build();

        Self {
            verbosity,
            logger,
            spinner: RefCell::new(None),
        }
    }

    fn log(&self, level: Level, message: &str) {
        self.logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target(module_path!())
                .build(),
        );
    }

    pub fn info(&self, message: &str) {
        match self.verbosity {
            VerbosityLevel::Quiet => {
                if self.spinner.borrow().is_none() {
                    let spinner = ProgressBar::new_spinner();
                    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                        spinner.set_style(style);
                    }
                    spinner.enable_steady_tick(Duration::from_millis(100));
                    *self.spinner.borrow_mut() = Some(spinner);
                }

                if let Some(spinner) = self.spinner.borrow().as_ref() {
                    spinner.set_message(message.to_string());
                }
            }
            _ => self.log(Level::Info, message),
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Debug, message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Warn, message);
        }
    }

    /// Reports the running count of decoded archive members.
    pub fn entries(&self, decoded: u64) {
        if decoded % ENTRY_REPORT_INTERVAL != 0 {
            return;
        }
        match self.verbosity {
            VerbosityLevel::Quiet => {
                if let Some(spinner) = self.spinner.borrow().as_ref() {
                    spinner.set_message(format!("Listing filesystem: {} entries", decoded));
                }
            }
            _ => self.debug(&format!("Decoded {} archive entries", decoded)),
        }
    }

    /// Clears the spinner, if one is showing.
    pub fn finish(&self) {
        if let Some(spinner) = self.spinner.borrow_mut().take() {
            spinner.finish_and_clear();
        }
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        self.verbosity
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.finish();
    }
}
