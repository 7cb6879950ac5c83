// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL. Every line is compiled into the `__main__` module, so
//! variables and imports carry over from one line to the next.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use marl_vm::{Value, Vm};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};

use crate::MAIN_MODULE;

const HISTORY_FILE: &str = ".marl_history";
const MAX_HISTORY_SIZE: usize = 1000;

const KEYWORDS: &[&str] = &["let", "import", "from", "as", "raise"];
const LITERALS: &[&str] = &["null", "true", "false"];

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
    Vars,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let input = input.trim().strip_prefix('.')?;

        let mut parts = input.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|arg| !arg.is_empty());

        let command = match cmd.as_str() {
            "help" | "h" | "?" => ReplCommand::Help,
            "exit" | "quit" | "q" => ReplCommand::Exit,
            "clear" | "cls" => ReplCommand::Clear,
            "version" | "v" => ReplCommand::Version,
            "load" | "l" => ReplCommand::Load,
            "vars" => ReplCommand::Vars,
            _ => return None,
        };
        Some((command, arg))
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Run a source file in the REPL module"),
            (".vars", "List variables of the REPL module"),
        ]
    }
}

/// Completion, hints, highlighting and multi-line input for rustyline
struct MarlHelper {
    words: Vec<String>,
}

impl MarlHelper {
    fn new(builtins: Vec<String>) -> Self {
        let words = KEYWORDS
            .iter()
            .chain(LITERALS)
            .map(|word| word.to_string())
            .chain(builtins)
            .chain(ReplCommand::all_commands().iter().map(|(cmd, _)| {
                cmd.split_whitespace().next().unwrap_or(cmd).to_string()
            }))
            .collect();

        Self { words }
    }

    fn word_start(line: &str) -> usize {
        line.rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

impl Completer for MarlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::word_start(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches = self
            .words
            .iter()
            .filter(|candidate| candidate.starts_with(word))
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for MarlHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }

        let word = &line[Self::word_start(line)..];
        if word.len() < 2 {
            return None;
        }

        self.words
            .iter()
            .find(|candidate| candidate.starts_with(word) && candidate.len() > word.len())
            .map(|candidate| (&candidate[word.len()..]).dimmed().to_string())
    }
}

impl Highlighter for MarlHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut current_word = String::new();
        let mut in_string = false;

        for c in line.chars() {
            if in_string {
                result.push_str(&c.green().to_string());
                if c == '"' {
                    in_string = false;
                }
                continue;
            }

            if c.is_alphanumeric() || c == '_' {
                current_word.push(c);
                continue;
            }

            if !current_word.is_empty() {
                result.push_str(&highlight_word(&current_word));
                current_word.clear();
            }

            let colored = match c {
                '"' => {
                    in_string = true;
                    c.green().to_string()
                }
                '(' | ')' => c.yellow().to_string(),
                '+' | '=' => c.cyan().to_string(),
                '.' if line.starts_with('.') => c.magenta().to_string(),
                _ => c.to_string(),
            };
            result.push_str(&colored);
        }

        if !current_word.is_empty() {
            result.push_str(&highlight_word(&current_word));
        }

        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    if KEYWORDS.contains(&word) {
        word.magenta().bold().to_string()
    } else if LITERALS.contains(&word) {
        word.blue().to_string()
    } else if word.chars().all(|c| c.is_ascii_digit()) {
        word.yellow().to_string()
    } else {
        word.to_string()
    }
}

impl Validator for MarlHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();

        if !is_balanced(input) {
            return Ok(ValidationResult::Incomplete);
        }

        let trimmed = input.trim_end();
        if trimmed.ends_with(['+', '=', ',', '(', '\\']) {
            return Ok(ValidationResult::Incomplete);
        }

        Ok(ValidationResult::Valid(None))
    }
}

impl Helper for MarlHelper {}

/// Check that parentheses are balanced and strings are closed
fn is_balanced(input: &str) -> bool {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                // Let the compiler report a stray close paren
                let Some(next) = depth.checked_sub(1) else {
                    return true;
                };
                depth = next;
            }
            _ => {}
        }
    }

    depth == 0 && !in_string
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

/// The interactive REPL
pub struct Repl {
    vm: Vm,
    editor: Editor<MarlHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Create a REPL over an existing VM
    pub fn new(vm: Vm) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let builtins = vm.module_names(&vm.core_module()).unwrap_or_default();
        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(MarlHelper::new(builtins)));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("marl")
            .join(HISTORY_FILE);

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(&history_path);

        Ok(Self {
            vm,
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "marl>".bright_green().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.eval_and_print(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
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
        println!();
        println!(
            "  {} {} {}",
            "Marl".bright_cyan().bold(),
            "v".dimmed(),
            marl_vm::VERSION.bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!("{} {}", "marl".bright_cyan().bold(), marl_vm::VERSION.yellow());
            }
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(Path::new(path)),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
            ReplCommand::Vars => self.print_vars(),
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();
        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }
        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:16} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:16} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:16} {}", "Tab".yellow(), "Autocomplete".dimmed());
        println!();
    }

    fn print_vars(&mut self) {
        // Make sure the module exists before listing it
        if let Err(error) = self.vm.interpret(MAIN_MODULE, "") {
            print_error(&error);
            return;
        }

        let main = match self.vm.load_module(MAIN_MODULE) {
            Ok(main) => main,
            Err(error) => return print_error(&error),
        };
        let core = self.vm.module_names(&self.vm.core_module()).unwrap_or_default();
        for name in self.vm.module_names(&main).unwrap_or_default() {
            if core.contains(&name) {
                continue;
            }
            let value = self.vm.module_variable(&main, &name).unwrap_or_default();
            println!("  {} = {}", name.white().bold(), self.format_value(&value));
        }
    }

    fn load_file(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(source) => self.eval_and_print(&source),
            Err(error) => eprintln!(
                "{}: {}: {}",
                "IOError".red().bold(),
                path.display(),
                error
            ),
        }
    }

    fn eval_and_print(&mut self, input: &str) {
        match self.vm.interpret(MAIN_MODULE, input) {
            Ok(Value::Null) => {}
            Ok(value) => println!("{}", self.format_value(&value)),
            Err(error) => print_error(&error),
        }
    }

    /// Format a value for display with syntax coloring
    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".blue().to_string(),
            Value::Bool(b) => b.yellow().to_string(),
            Value::Int(n) => n.yellow().to_string(),
            Value::Str(s) => format!("\"{}\"", s).green().to_string(),
            Value::Object(_) => self.vm.stringify(value).cyan().to_string(),
        }
    }
}

/// Print an error with its class highlighted
fn print_error(error: &marl_vm::Error) {
    eprintln!("{}: {}", error.kind().red().bold(), error.message());
}
