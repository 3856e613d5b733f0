// Copyright 2020 The Weft Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging wrapper used throughout the workspace. Builds a log4rs setup
//! with a console appender, an optional plain file appender, per-appender
//! level thresholds and a filter keeping foreign crates out of the log.
//! Log rotation is left to the operator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::{panic, thread};

use backtrace::Backtrace;
use log::{error, info, LevelFilter, Record};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::{threshold::ThresholdFilter, Filter, Response};

use crate::types::{LogLevel, LoggingConfig};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {t} {m}{n}";

/// Guards against initializing log4rs twice.
static WAS_INIT: AtomicBool = AtomicBool::new(false);

fn level_filter(level: &LogLevel) -> LevelFilter {
	match level {
		LogLevel::Error => LevelFilter::Error,
		LogLevel::Warning => LevelFilter::Warn,
		LogLevel::Info => LevelFilter::Info,
		LogLevel::Debug => LevelFilter::Debug,
		LogLevel::Trace => LevelFilter::Trace,
	}
}

/// Only records originating from the workspace's own crates pass.
#[derive(Debug)]
struct WorkspaceFilter;

impl Filter for WorkspaceFilter {
	fn filter(&self, record: &Record<'_>) -> Response {
		match record.module_path() {
			Some(path) if path.starts_with("weft") => Response::Neutral,
			_ => Response::Reject,
		}
	}
}

/// An appender gated by a level threshold and the workspace filter.
fn filtered_appender(name: &str, append: Box<dyn Append>, level: LevelFilter) -> Appender {
	Appender::builder()
		.filter(Box::new(ThresholdFilter::new(level)))
		.filter(Box::new(WorkspaceFilter))
		.build(name, append)
}

/// Initialize the logger with the given configuration. Safe to call more
/// than once; only the first call takes effect.
pub fn init_logger(config: Option<LoggingConfig>) {
	if let Some(c) = config {
		if WAS_INIT.swap(true, Ordering::SeqCst) {
			return;
		}

		let stdout_level = level_filter(&c.stdout_log_level);
		let file_level = level_filter(&c.file_log_level);

		let mut appenders = vec![];
		let mut root = Root::builder();

		if c.log_to_stdout {
			let console = ConsoleAppender::builder()
				.encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
				.build();
			appenders.push(filtered_appender("stdout", Box::new(console), stdout_level));
			root = root.appender("stdout");
		}

		if c.log_to_file {
			let file = FileAppender::builder()
				.append(c.log_file_append)
				.encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
				.build(&c.log_file_path);
			match file {
				Ok(file) => {
					appenders.push(filtered_appender("file", Box::new(file), file_level));
					root = root.appender("file");
				}
				// logging isn't up yet, stderr is all we have
				Err(e) => eprintln!("unable to open log file {}: {}", c.log_file_path, e),
			}
		}

		let config = Config::builder()
			.appenders(appenders)
			.build(root.build(stdout_level.max(file_level)))
			.expect("invalid logging configuration");
		log4rs::init_config(config).expect("logger already initialized");

		info!(
			"logging initialised, stdout: {:?}, file: {:?}",
			stdout_level, file_level
		);
	}

	log_panics();
}

/// Initializes a console-only debug logger for unit and integration tests.
pub fn init_test_logger() {
	if WAS_INIT.swap(true, Ordering::SeqCst) {
		return;
	}

	let console = ConsoleAppender::builder()
		.encoder(Box::new(PatternEncoder::default()))
		.build();
	let config = Config::builder()
		.appender(filtered_appender(
			"stdout",
			Box::new(console),
			LevelFilter::Debug,
		))
		.build(Root::builder().appender("stdout").build(LevelFilter::Debug))
		.expect("invalid logging configuration");
	log4rs::init_config(config).expect("logger already initialized");
}

/// Routes panics through the error log, with a backtrace.
fn log_panics() {
	panic::set_hook(Box::new(|info| {
		let thread = thread::current();
		let name = thread.name().unwrap_or("<unnamed>");

		let message = match info.payload().downcast_ref::<&str>() {
			Some(s) => (*s).to_string(),
			None => match info.payload().downcast_ref::<String>() {
				Some(s) => s.clone(),
				None => "panic".to_string(),
			},
		};

		match info.location() {
			Some(location) => error!(
				"thread '{}' panicked at {}:{}: {}\n{:?}",
				name,
				location.file(),
				location.line(),
				message,
				Backtrace::new()
			),
			None => error!(
				"thread '{}' panicked: {}\n{:?}",
				name,
				message,
				Backtrace::new()
			),
		}
	}));
}
