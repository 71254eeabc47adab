/// Console commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "get",
    aliases: &["g", "list", "ls", "show"],
    usage: "get <domain> [id] [key=value ...]",
    description: "Read a collection or entity through the cache",
  },
  Command {
    name: "create",
    aliases: &["new", "add"],
    usage: "create <domain> <json>",
    description: "Create an entity",
  },
  Command {
    name: "update",
    aliases: &["u", "edit", "put"],
    usage: "update <domain> <id> <json>",
    description: "Update an entity",
  },
  Command {
    name: "delete",
    aliases: &["rm", "del"],
    usage: "delete <domain> <id>",
    description: "Delete an entity",
  },
  Command {
    name: "review",
    aliases: &["approve"],
    usage: "review <expense-id> approve|reject [comment]",
    description: "Approve or reject an expense",
  },
  Command {
    name: "invalidate",
    aliases: &["inv", "refresh"],
    usage: "invalidate <domain>",
    description: "Drop cached entries of a domain",
  },
  Command {
    name: "clear-all",
    aliases: &["clear", "purge"],
    usage: "clear-all",
    description: "Clear every client's cache (admin only)",
  },
  Command {
    name: "stats",
    aliases: &["st", "cache"],
    usage: "stats",
    description: "Cache counters and cached keys",
  },
  Command {
    name: "domains",
    aliases: &["d", "tags"],
    usage: "domains",
    description: "List resource domains",
  },
  Command {
    name: "rules",
    aliases: &["r", "deps"],
    usage: "rules [domain]",
    description: "Show invalidation rules",
  },
  Command {
    name: "status",
    aliases: &["push", "whoami"],
    usage: "status",
    description: "Session and push channel state",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit erpq",
  },
];

/// Resolve a typed command word by exact name or alias.
pub fn resolve(input: &str) -> Option<&'static Command> {
  let input_lower = input.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == input_lower || cmd.aliases.contains(&input_lower.as_str()))
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("invalidate");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "invalidate");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("rm");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "delete");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("rev");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "review");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("-al");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "clear-all");
  }

  #[test]
  fn test_resolve_requires_exact_word() {
    assert_eq!(resolve("LS").map(|c| c.name), Some("get"));
    assert_eq!(resolve("clear").map(|c| c.name), Some("clear-all"));
    assert!(resolve("inva").is_none());
  }

  #[test]
  fn test_names_and_aliases_are_unique() {
    let mut words: Vec<&str> = COMMANDS
      .iter()
      .flat_map(|c| std::iter::once(c.name).chain(c.aliases.iter().copied()))
      .collect();
    let total = words.len();
    words.sort_unstable();
    words.dedup();
    assert_eq!(words.len(), total);
  }
}
