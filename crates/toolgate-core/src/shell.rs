//! Shell command-line analysis for shell-executing tools.
//!
//! Given the raw command line an agent wants a shell tool to run, this
//! module extracts the *effective* command a human (or policy) should
//! judge. Prefixed environment assignments, wrapper interpreters, and
//! subcommands can all hide the real action: `FOO=1 git -C /tmp log` is
//! really `git log`, and `bash -c 'rm -rf /'` is really an opaque
//! `bash -c`. Nothing here executes anything; it is pure string
//! analysis feeding the approval preview.

/// Quote- and escape-aware tokenization of a shell command line.
///
/// Rules (a deliberate subset of POSIX shell):
/// - single quotes suppress all escaping;
/// - inside double quotes, backslash escapes `"`, `\`, `$` and backtick
///   only;
/// - outside quotes, backslash escapes the next character if it is a
///   quote, a backslash, or whitespace;
/// - unescaped whitespace separates tokens;
/// - unterminated quotes flush the current token, and a trailing stray
///   backslash is kept literally.
pub fn tokenize_command(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                for inner in chars.by_ref() {
                    if inner == '\'' {
                        break;
                    }
                    current.push(inner);
                }
            }
            '"' => {
                in_token = true;
                while let Some(inner) = chars.next() {
                    match inner {
                        '"' => break,
                        '\\' => match chars.peek() {
                            Some(&next @ ('"' | '\\' | '$' | '`')) => {
                                current.push(next);
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        _ => current.push(inner),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.peek() {
                    Some(&next)
                        if next == '\'' || next == '"' || next == '\\' || next.is_whitespace() =>
                    {
                        current.push(next);
                        chars.next();
                    }
                    Some(_) => current.push('\\'),
                    // Trailing stray backslash is kept literally
                    None => current.push('\\'),
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}

/// Whether a token is a `NAME=value` environment assignment.
fn is_env_assignment(token: &str) -> bool {
    let Some(eq) = token.find('=') else {
        return false;
    };
    let name = &token[..eq];
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// git global options that consume the following token as a value.
const GIT_VALUE_OPTIONS: &[&str] = &[
    "-C",
    "-c",
    "--git-dir",
    "--work-tree",
    "--namespace",
    "--exec-path",
    "--config-env",
];

/// Package-manager global options that consume a value.
const PKG_VALUE_OPTIONS: &[&str] = &["-C", "--prefix", "--cwd", "--registry", "--dir"];

/// Package-manager subcommands whose real action is the following target.
const PKG_TARGET_SUBCOMMANDS: &[&str] = &["run", "exec", "dlx"];

/// python options that consume a value.
const PYTHON_VALUE_OPTIONS: &[&str] = &["-c", "-W", "-X", "--check-hash-based-pycs"];

/// Generic interpreter options that consume a value (inline code, etc.).
const INTERPRETER_VALUE_OPTIONS: &[&str] = &["-e", "--eval", "-c"];

const INTERPRETERS: &[&str] = &[
    "node",
    "deno",
    "ruby",
    "php",
    "perl",
    "bash",
    "sh",
    "zsh",
    "pwsh",
    "powershell",
];

/// Extract the effective base command from a raw shell command line.
///
/// Skips leading environment assignments, then classifies the first
/// real token, unwrapping one level of subcommand or interpreter
/// indirection. Returns the bare command name if no further structure
/// is found.
pub fn base_command(line: &str) -> String {
    let tokens = tokenize_command(line.trim());

    let mut iter = tokens.into_iter().skip_while(|t| is_env_assignment(t));
    let Some(command) = iter.next() else {
        return String::new();
    };
    let rest: Vec<String> = iter.collect();

    let name = command_name(&command);
    match name {
        "git" => git_base(&command, &rest),
        "npm" | "pnpm" | "bun" | "yarn" => package_manager_base(&command, &rest),
        "python" | "python3" => interpreter_base(&command, &rest, PYTHON_VALUE_OPTIONS, true),
        _ if INTERPRETERS.contains(&name) => {
            interpreter_base(&command, &rest, INTERPRETER_VALUE_OPTIONS, false)
        }
        _ => generic_base(&command, &rest),
    }
}

/// Strip any path prefix so `/usr/bin/git` classifies like `git`.
fn command_name(command: &str) -> &str {
    command.rsplit(['/', '\\']).next().unwrap_or(command)
}

fn git_base(command: &str, rest: &[String]) -> String {
    let mut i = 0;
    while i < rest.len() {
        let token = rest[i].as_str();
        if GIT_VALUE_OPTIONS.contains(&token) {
            i += 2; // option + its value
        } else if token.starts_with('-') {
            i += 1; // flag (or --opt=value) with no separate value
        } else {
            return format!("{command} {token}");
        }
    }
    command.to_string()
}

fn package_manager_base(command: &str, rest: &[String]) -> String {
    let mut i = 0;
    while i < rest.len() {
        let token = rest[i].as_str();
        if PKG_VALUE_OPTIONS.contains(&token) {
            i += 2;
        } else if token.starts_with('-') {
            i += 1;
        } else {
            // Found the subcommand; run/exec/dlx act on a further target
            if PKG_TARGET_SUBCOMMANDS.contains(&token) {
                if let Some(target) = rest[i + 1..].iter().find(|t| !t.starts_with('-')) {
                    return format!("{command} {token} {target}");
                }
            }
            return format!("{command} {token}");
        }
    }
    command.to_string()
}

/// Shared interpreter handling. With `module_flag` set (python), `-m`
/// captures the following token as the effective target. A value-taking
/// option's value is never treated as a positional target; if nothing
/// positional remains, the option itself is reported so the caller
/// still sees e.g. `bash -c` rather than a bare `bash`.
fn interpreter_base(
    command: &str,
    rest: &[String],
    value_options: &[&str],
    module_flag: bool,
) -> String {
    let mut last_value_option: Option<&str> = None;
    let mut i = 0;
    while i < rest.len() {
        let token = rest[i].as_str();
        if module_flag && (token == "-m" || token == "--module") {
            if let Some(module) = rest.get(i + 1) {
                return format!("{command} -m {module}");
            }
            return format!("{command} -m");
        }
        if value_options.contains(&token) {
            last_value_option = Some(token);
            i += 2;
        } else if token.starts_with('-') {
            i += 1;
        } else {
            return format!("{command} {token}");
        }
    }
    match last_value_option {
        Some(option) => format!("{command} {option}"),
        None => command.to_string(),
    }
}

fn generic_base(command: &str, rest: &[String]) -> String {
    // Skip at most one leading option-like token
    let mut i = 0;
    if rest.first().is_some_and(|t| t.starts_with('-')) {
        i = 1;
    }
    match rest.get(i) {
        Some(target) if !target.starts_with('-') => format!("{command} {target}"),
        _ => command.to_string(),
    }
}
