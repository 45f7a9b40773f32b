//! Printable-rune checking, cross-post link extraction, and board filters
//! (spec §4.3). These are pure functions over runes/byte buffers — no I/O,
//! no suspension, matching the "CPU-only, must not suspend mid-operation"
//! rule in spec §5.

use crate::model::CommandResult;
use crate::registry::Registry;
use std::collections::HashMap;

/// Is `c` acceptable in a post body? `allow_newline` gates `'\n'` itself —
/// callers still enforce the line-count cap separately.
pub fn is_printable(c: char, allow_newline: bool) -> bool {
    if c == '\0' {
        return false;
    }
    if c == '\n' {
        return allow_newline;
    }
    if c == '\t' {
        return true;
    }
    if c.is_control() {
        return false;
    }
    true
}

/// Does every rune in `s` satisfy [`is_printable`]?
pub fn all_printable(s: &str, allow_newline: bool) -> bool {
    s.chars().all(|c| is_printable(c, allow_newline))
}

/// The result of a single [`parse_body`] pass.
#[derive(Debug, Default, Clone)]
pub struct ParsedBody {
    pub links: Vec<u64>,
    pub commands: Vec<CommandResult>,
}

/// Resolves a `#<label>:<arg>` command token. Boards configure which
/// resolver(s) apply; the core only recognizes the token boundary.
pub trait CommandTable: Send + Sync {
    fn resolve(&self, label: &str, arg: &str, seed: u64) -> Option<i64>;
}

impl CommandTable for crate::model::DiceResolver {
    fn resolve(&self, label: &str, arg: &str, seed: u64) -> Option<i64> {
        crate::model::CommandResolver::resolve(self, label, arg, seed)
    }
}

/// Scan `body` for `>>N` reply links and `#label:arg` commands.
///
/// `final_parse` controls two things (spec §4.3): unresolved `>>N` refs are
/// kept on a final parse (so the client still renders a dead-link marker)
/// but dropped on intermediate parses, and command results are only cached
/// (and thus stable across replay) once `final_parse` is true.
pub fn parse_body(
    body: &str,
    registry: &Registry,
    resolver: &dyn CommandTable,
    post_id: u64,
    final_parse: bool,
) -> ParsedBody {
    let mut out = ParsedBody::default();
    let mut chars = body.char_indices().peekable();
    let mut command_index = 0usize;

    while let Some((_, c)) = chars.next() {
        match c {
            '>' if matches!(chars.peek(), Some((_, '>'))) => {
                chars.next();
                let mut digits = String::new();
                while let Some((_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(*d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Ok(n) = digits.parse::<u64>() {
                    let resolved = registry.lookup(n).is_some();
                    if resolved || final_parse {
                        out.links.push(n);
                    }
                }
            }
            '#' => {
                let mut label = String::new();
                while let Some((_, d)) = chars.peek() {
                    if d.is_alphanumeric() {
                        label.push(*d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek().map(|(_, d)| *d) == Some(':') {
                    chars.next();
                    let mut arg = String::new();
                    while let Some((_, d)) = chars.peek() {
                        if d.is_alphanumeric() {
                            arg.push(*d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if final_parse {
                        let seed = post_id.wrapping_add(command_index as u64);
                        if let Some(value) = resolver.resolve(&label, &arg, seed) {
                            out.commands.push(CommandResult {
                                index: command_index,
                                label,
                                value,
                            });
                        }
                    }
                    command_index += 1;
                }
            }
            _ => {}
        }
    }

    out
}

/// A single board content filter: replaces every occurrence of `pattern`
/// with `replacement`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub pattern: String,
    pub replacement: String,
}

/// Board-keyed filter table. Matches `applyFilters`/`registerFilter` in
/// spec §4.3: filters are installed per board (op here stands in for board
/// tag, since the source keys filters by the thread the post lives in).
#[derive(Default)]
pub struct FilterTable {
    filters: HashMap<String, Vec<Filter>>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a filter for `board`. Returns `true` — a `registerFilter`
    /// caller skips normal parsing for this message when this is `true`
    /// (spec §4.5 step 1): registering a filter handles the message itself,
    /// it is never combined with a normal parse on the same call.
    pub fn register_filter(&mut self, board: &str, filter: Filter) -> bool {
        self.filters.entry(board.to_string()).or_default().push(filter);
        true
    }

    /// Rewrite `body` in place per every filter installed for `board`.
    /// Returns whether any replacement fired.
    pub fn apply_filters(&self, board: &str, body: &mut String) -> bool {
        let Some(filters) = self.filters.get(board) else {
            return false;
        };
        let mut changed = false;
        for f in filters {
            if body.contains(f.pattern.as_str()) {
                *body = body.replace(f.pattern.as_str(), f.replacement.as_str());
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiceResolver;

    #[test]
    fn rejects_nul_and_bare_control() {
        assert!(!is_printable('\0', true));
        assert!(!is_printable('\u{7}', true));
        assert!(is_printable('\t', true));
        assert!(is_printable('\n', true));
        assert!(!is_printable('\n', false));
        assert!(is_printable('→', true));
    }

    #[test]
    fn extracts_resolved_and_final_only_links() {
        let registry = Registry::new();
        registry.record(5, 5);
        let resolver = DiceResolver;
        let body = ">>5 hello >>999 world";
        let intermediate = parse_body(body, &registry, &resolver, 1, false);
        assert_eq!(intermediate.links, vec![5]);
        let final_pass = parse_body(body, &registry, &resolver, 1, true);
        assert_eq!(final_pass.links, vec![5, 999]);
    }

    #[test]
    fn resolves_dice_command_only_on_final_parse() {
        let registry = Registry::new();
        let resolver = DiceResolver;
        let body = "rolling #dice:3d6 now";
        let intermediate = parse_body(body, &registry, &resolver, 1, false);
        assert!(intermediate.commands.is_empty());
        let final_pass = parse_body(body, &registry, &resolver, 1, true);
        assert_eq!(final_pass.commands.len(), 1);
        assert_eq!(final_pass.commands[0].label, "dice");
    }

    #[test]
    fn filter_apply_is_idempotent() {
        let mut table = FilterTable::new();
        table.register_filter(
            "a",
            Filter {
                pattern: "badword".into(),
                replacement: "****".into(),
            },
        );
        let mut body = "this is a badword here".to_string();
        assert!(table.apply_filters("a", &mut body));
        assert_eq!(body, "this is a **** here");
        assert!(!table.apply_filters("a", &mut body));
    }
}
