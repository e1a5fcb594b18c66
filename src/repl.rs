// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive shell for building a mock session and probing requests.

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};
use spacey_mock::{
    AliasPlugin, Decision, Manifest, MockError, MockPlugin, MockSession, PassPattern,
    ProtectNodeModules, RelativePlugin, Requester, Strategy, Value,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HISTORY_FILE: &str = ".spacey_mock_history";
const MAX_HISTORY_SIZE: usize = 1000;

/// Dot-commands understood by the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Mock,
    With,
    Default,
    Es6,
    CallThrough,
    By,
    Isolation,
    Pass,
    Plugin,
    Load,
    Explain,
    Status,
    Flush,
    Reset,
}

impl ReplCommand {
    /// Split `.name rest` into a command and its trimmed argument
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim();
        let body = input.strip_prefix('.')?;

        let mut parts = body.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let command = match cmd.as_str() {
            "help" | "h" | "?" => ReplCommand::Help,
            "exit" | "quit" | "q" => ReplCommand::Exit,
            "clear" | "cls" => ReplCommand::Clear,
            "version" | "v" => ReplCommand::Version,
            "mock" | "m" => ReplCommand::Mock,
            "with" | "w" => ReplCommand::With,
            "default" => ReplCommand::Default,
            "es6" => ReplCommand::Es6,
            "call-through" | "ct" => ReplCommand::CallThrough,
            "by" => ReplCommand::By,
            "isolation" | "iso" => ReplCommand::Isolation,
            "pass" => ReplCommand::Pass,
            "plugin" => ReplCommand::Plugin,
            "load" | "l" => ReplCommand::Load,
            "explain" | "x" => ReplCommand::Explain,
            "status" | "s" => ReplCommand::Status,
            "flush" => ReplCommand::Flush,
            "reset" => ReplCommand::Reset,
            _ => return None,
        };
        Some((command, arg))
    }

    /// Commands with their help text
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".mock <module>", "Select a module to mock"),
            (".with <name>=<json>", "Add an export to the selected mock"),
            (".default <json>", "Set the default export (implies .es6)"),
            (".es6", "Mark the selected mock as an ES module"),
            (".call-through", "Merge the mock over the real module"),
            (".by <module>", "Serve another module in place of the selected one"),
            (".isolation on|off", "Reject unmocked, unlisted modules"),
            (".pass <pattern>", "Passlist a pattern (re:…, glob:…, or substring)"),
            (".plugin <name>", "relative | protect-node-modules | alias <from> <to>"),
            (".load <manifest>", "Apply a TOML or JSON manifest"),
            (".explain <request>", "Show what a request would load (or type it bare)"),
            (".status", "Show mocks, passlist and flags"),
            (".flush", "Evict touched modules from the cache"),
            (".reset", "Drop every mock and pass pattern"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".help", "Show this help message"),
            (".exit", "Exit the shell"),
        ]
    }
}

/// Parse a pass pattern: `re:<regex>`, `glob:<glob>`, or a substring
pub fn parse_pattern(text: &str) -> spacey_mock::Result<PassPattern> {
    if let Some(source) = text.strip_prefix("re:") {
        PassPattern::regex(source)
    } else if let Some(source) = text.strip_prefix("glob:") {
        PassPattern::glob(source)
    } else {
        Ok(PassPattern::literal(text))
    }
}

/// Parse `name=<json>`; values that are not JSON are taken as strings
pub fn parse_export(text: &str) -> Option<(&str, Value)> {
    let (name, raw) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, parse_value(raw.trim())))
}

fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from(&json),
        Err(_) => Value::from(raw),
    }
}

/// Build the plugin named by `.plugin` arguments
pub fn parse_plugin(text: &str) -> Option<Arc<dyn MockPlugin>> {
    let mut words = text.split_whitespace();
    match (words.next()?, words.next(), words.next()) {
        ("relative", None, None) => Some(Arc::new(RelativePlugin)),
        ("protect-node-modules", None, None) => Some(Arc::new(ProtectNodeModules)),
        ("alias", Some(from), Some(to)) => Some(Arc::new(AliasPlugin::new(from, to))),
        _ => None,
    }
}

#[derive(Default)]
struct MockHelper {
    commands: Vec<String>,
}

impl MockHelper {
    fn new() -> Self {
        let commands = ReplCommand::all_commands()
            .iter()
            .filter_map(|(usage, _)| usage.split_whitespace().next())
            .map(String::from)
            .collect();
        Self { commands }
    }
}

impl Completer for MockHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let word = &line[..pos];
        if !word.starts_with('.') || word.contains(char::is_whitespace) {
            return Ok((pos, vec![]));
        }

        let matches = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(word))
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for MockHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() || line.len() < 2 || !line.starts_with('.') {
            return None;
        }

        self.commands
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string().dimmed().to_string())
    }
}

impl Highlighter for MockHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if !line.starts_with('.') {
            return Cow::Borrowed(line);
        }
        match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => Cow::Owned(format!("{} {}", cmd.magenta(), rest)),
            None => Cow::Owned(line.magenta().to_string()),
        }
    }

    fn highlight_char(&self, line: &str, _pos: usize, _forced: bool) -> bool {
        line.starts_with('.')
    }
}

impl Validator for MockHelper {}

impl Helper for MockHelper {}

/// The interactive shell
pub struct Repl {
    session: MockSession,
    editor: Editor<MockHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a shell driving `session`
    pub fn new(session: MockSession) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(MockHelper::new()));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spacey")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(&history_path);

        Ok(Self {
            session,
            editor,
            history_path,
        })
    }

    /// Run until `.exit` or end of input
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "mock>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match ReplCommand::parse(trimmed) {
                        Some((cmd, arg)) => match self.execute_command(cmd, arg) {
                            CommandResult::Continue => {}
                            CommandResult::Exit => break,
                        },
                        None if trimmed.starts_with('.') => {
                            eprintln!(
                                "{}: unknown command {} (try {})",
                                "Error".red().bold(),
                                trimmed.cyan(),
                                ".help".cyan()
                            );
                        }
                        None => self.explain(trimmed),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&self.history_path);
        Ok(())
    }

    fn print_banner(&self) {
        println!(
            "{} {} (entry {})",
            "spacey-mock".cyan().bold(),
            spacey_mock::VERSION.yellow(),
            self.session.entry_point().id().dimmed()
        );
        println!("Type {} for help, {} to exit", ".help".green(), ".exit".green());
        println!();
    }

    fn execute_command(&self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        let session = &self.session;
        match (cmd, arg) {
            (ReplCommand::Help, _) => self.print_help(),
            (ReplCommand::Exit, _) => return CommandResult::Exit,
            (ReplCommand::Clear, _) => print!("\x1B[2J\x1B[H"),
            (ReplCommand::Version, _) => {
                println!("{}: {}", "spacey-mock".bright_cyan().bold(), spacey_mock::VERSION.yellow());
            }
            (ReplCommand::Mock, Some(name)) => {
                session.select(name);
                self.print_target();
            }
            (ReplCommand::With, Some(text)) => match parse_export(text) {
                Some((name, value)) => {
                    self.when_selected(|s| {
                        s.with_exports([(name, value)]);
                    });
                }
                None => usage(".with <name>=<json>"),
            },
            (ReplCommand::Default, Some(raw)) => {
                let value = parse_value(raw);
                self.when_selected(|s| {
                    s.with_default_export(value);
                });
            }
            (ReplCommand::Es6, _) => self.when_selected(|s| {
                s.as_interop_module();
            }),
            (ReplCommand::CallThrough, _) => self.when_selected(|s| {
                s.allow_call_through();
            }),
            (ReplCommand::By, Some(name)) => self.when_selected(|s| {
                s.delegate_to(name);
            }),
            (ReplCommand::Isolation, Some("on")) => session.set_isolation(true),
            (ReplCommand::Isolation, Some("off")) => session.set_isolation(false),
            (ReplCommand::Isolation, _) => usage(".isolation on|off"),
            (ReplCommand::Pass, Some(text)) => match parse_pattern(text) {
                Ok(pattern) => {
                    session.add_passlist_entry(pattern);
                }
                Err(err) => print_error(&err),
            },
            (ReplCommand::Plugin, Some(text)) => match parse_plugin(text) {
                Some(plugin) => {
                    session.add_plugin(plugin);
                }
                None => usage(".plugin relative | protect-node-modules | alias <from> <to>"),
            },
            (ReplCommand::Load, Some(path)) => {
                match Manifest::from_path(Path::new(path)).and_then(|m| m.apply(session)) {
                    Ok(()) => println!("{} {}", "loaded".green(), path),
                    Err(err) => print_error(&err),
                }
            }
            (ReplCommand::Explain, Some(request)) => self.explain(request),
            (ReplCommand::Status, _) => self.print_status(),
            (ReplCommand::Flush, _) => session.flush(),
            (ReplCommand::Reset, _) => session.reset(),
            (_, None) => {
                let name = ReplCommand::all_commands()
                    .iter()
                    .map(|(usage, _)| *usage)
                    .find(|usage| ReplCommand::parse(usage).map(|(c, _)| c) == Some(cmd))
                    .unwrap_or(".help");
                usage(name);
            }
        }
        CommandResult::Continue
    }

    fn when_selected<F>(&self, f: F)
    where
        F: FnOnce(&MockSession),
    {
        if self.session.current_target().is_none() {
            eprintln!(
                "{}: select a module with {} first",
                "Error".red().bold(),
                ".mock".cyan()
            );
            return;
        }
        f(&self.session);
        self.print_target();
    }

    fn print_target(&self) {
        if let Some(id) = self.session.current_target() {
            if let Some(descriptor) = self.session.descriptor(id.as_str()) {
                println!("{} {}", format_strategy(descriptor.strategy()), id.bold());
                if !descriptor.overrides().is_empty() {
                    println!("  {}", descriptor.overrides().dimmed());
                }
            }
        }
    }

    fn explain(&self, request: &str) {
        let entry: Requester = self.session.entry_point();
        match self.session.explain(request, &entry) {
            Ok(decision) => println!("{}", format_decision(request, &decision)),
            Err(err) => print_error(&err),
        }
    }

    fn print_status(&self) {
        let session = &self.session;
        println!();
        println!("{} {}", "entry:".white().bold(), session.entry_point().id());
        println!(
            "{} {}",
            "isolation:".white().bold(),
            if session.is_isolated() { "on".red().to_string() } else { "off".green().to_string() }
        );
        println!("{} {:?}", "plugins:".white().bold(), session.plugins());

        println!("{}", "passlist:".white().bold());
        for pattern in session.passlist().patterns() {
            println!("  {}", pattern);
        }

        println!("{}", "mocks:".white().bold());
        for id in session.mocked_modules() {
            if let Some(descriptor) = session.descriptor(id.as_str()) {
                println!("  {} {}", format_strategy(descriptor.strategy()), id);
            }
        }
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Commands:".white().bold());
        println!();
        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:22} {}", cmd.cyan(), desc.dimmed());
        }
        println!();
        println!("{}", "Any other line is explained as a request from the entry point.".dimmed());
        println!();
    }
}

enum CommandResult {
    Continue,
    Exit,
}

fn usage(text: &str) {
    eprintln!("{}: {}", "usage".yellow().bold(), text.cyan());
}

fn format_strategy(strategy: Strategy<'_>) -> String {
    match strategy {
        Strategy::Delegate(target) => format!("{} {} ->", "delegate".cyan(), target),
        Strategy::CallThrough => "call-through".yellow().to_string(),
        Strategy::Replace => "mock".green().to_string(),
    }
}

/// One colored line describing what `request` would load
pub fn format_decision(request: &str, decision: &Decision) -> String {
    let verdict = match decision {
        Decision::Replace { id } => format!("{} {}", "mock".green().bold(), id),
        Decision::CallThrough { id } => format!("{} {}", "call-through".yellow().bold(), id),
        Decision::Delegate { id, target } => {
            format!("{} {} -> {}", "delegate".cyan().bold(), id, target)
        }
        Decision::PassThrough { id } => format!("{} {}", "real".dimmed(), id),
        Decision::Rejected { .. } => "rejected".red().bold().to_string(),
    };
    format!("{:30} {}", request, verdict)
}

/// Print an error with its category highlighted
pub fn print_error(error: &MockError) {
    let label = if error.is_isolation_violation() {
        "Isolation"
    } else {
        "Error"
    };
    eprintln!("{}: {}", label.red().bold(), error);
}
