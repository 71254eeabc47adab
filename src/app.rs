use crate::commands::{self, COMMANDS};
use crate::event::{Event, EventHandler};
use color_eyre::{eyre::eyre, Result};
use erpq::admin::{ClearAllTrigger, TriggerError};
use erpq::cache::{CacheResult, CacheStore, Domain, KeyPattern, Operation, RuleTable};
use erpq::config::Config;
use erpq::erp::{ApiError, CachedErpClient, ErpClient, ExpenseReview, ListQuery, ReviewStatus, Session};
use erpq::push::{ChannelState, Notification, NotificationLevel, PushChannel, WsConnector};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  Get {
    domain: Domain,
    id: Option<String>,
    query: ListQuery,
  },
  Create {
    domain: Domain,
    body: Value,
  },
  Update {
    domain: Domain,
    id: String,
    body: Value,
  },
  Delete {
    domain: Domain,
    id: String,
  },
  Review {
    id: String,
    review: ExpenseReview,
  },
  Invalidate(Domain),
  ClearAll,
  Stats,
  Domains,
  Rules(Option<Domain>),
  Status,
  Help,
  Quit,
}

/// Split off the first whitespace-delimited word.
fn next_word(input: &str) -> (&str, &str) {
  let input = input.trim_start();
  match input.find(char::is_whitespace) {
    Some(pos) => (&input[..pos], input[pos..].trim_start()),
    None => (input, ""),
  }
}

fn require_word<'a>(input: &'a str, what: &str, usage: &str) -> Result<(&'a str, &'a str)> {
  let (word, rest) = next_word(input);
  if word.is_empty() {
    return Err(eyre!("Missing {}. Usage: {}", what, usage));
  }
  Ok((word, rest))
}

fn parse_domain(word: &str) -> Result<Domain> {
  word
    .parse::<Domain>()
    .map_err(|e| eyre!("{}. Run 'domains' for the list.", e))
}

fn parse_json(input: &str, usage: &str) -> Result<Value> {
  if input.trim().is_empty() {
    return Err(eyre!("Missing JSON body. Usage: {}", usage));
  }
  serde_json::from_str(input).map_err(|e| eyre!("Invalid JSON body: {}", e))
}

/// `page`, `limit` and `search` are paging controls; every other pair is a filter.
fn parse_query(words: &[&str]) -> Result<ListQuery> {
  let mut query = ListQuery::default();
  for word in words {
    let (name, value) = word
      .split_once('=')
      .ok_or_else(|| eyre!("Expected key=value, got '{}'", word))?;
    query = match name {
      "page" => query.page(
        value
          .parse()
          .map_err(|_| eyre!("page must be a number, got '{}'", value))?,
      ),
      "limit" => query.limit(
        value
          .parse()
          .map_err(|_| eyre!("limit must be a number, got '{}'", value))?,
      ),
      "search" => query.search(value),
      _ => query.filter(name, value),
    };
  }
  Ok(query)
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Action>> {
  let (word, rest) = next_word(line);
  if word.is_empty() {
    return Ok(None);
  }

  let Some(command) = commands::resolve(word) else {
    let suggestions: Vec<&str> = commands::get_suggestions(word)
      .into_iter()
      .take(3)
      .map(|c| c.name)
      .collect();
    return Err(if suggestions.is_empty() {
      eyre!("Unknown command '{}'. Type 'help' for the list.", word)
    } else {
      eyre!(
        "Unknown command '{}'. Did you mean: {}?",
        word,
        suggestions.join(", ")
      )
    });
  };
  let usage = command.usage;

  let action = match command.name {
    "get" => {
      let (domain, rest) = require_word(rest, "domain", usage)?;
      let domain = parse_domain(domain)?;
      let mut words: Vec<&str> = rest.split_whitespace().collect();
      let id = match words.first() {
        Some(first) if !first.contains('=') => Some(words.remove(0).to_string()),
        _ => None,
      };
      Action::Get {
        domain,
        id,
        query: parse_query(&words)?,
      }
    }
    "create" => {
      let (domain, rest) = require_word(rest, "domain", usage)?;
      Action::Create {
        domain: parse_domain(domain)?,
        body: parse_json(rest, usage)?,
      }
    }
    "update" => {
      let (domain, rest) = require_word(rest, "domain", usage)?;
      let (id, rest) = require_word(rest, "id", usage)?;
      Action::Update {
        domain: parse_domain(domain)?,
        id: id.to_string(),
        body: parse_json(rest, usage)?,
      }
    }
    "delete" => {
      let (domain, rest) = require_word(rest, "domain", usage)?;
      let (id, _) = require_word(rest, "id", usage)?;
      Action::Delete {
        domain: parse_domain(domain)?,
        id: id.to_string(),
      }
    }
    "review" => {
      let (id, rest) = require_word(rest, "expense id", usage)?;
      let (verdict, comment) = require_word(rest, "verdict", usage)?;
      let status = match verdict.to_lowercase().as_str() {
        "approve" | "approved" => ReviewStatus::Approved,
        "reject" | "rejected" => ReviewStatus::Rejected,
        other => return Err(eyre!("Verdict must be approve or reject, got '{}'", other)),
      };
      Action::Review {
        id: id.to_string(),
        review: ExpenseReview {
          status,
          comment: (!comment.is_empty()).then(|| comment.to_string()),
        },
      }
    }
    "invalidate" => {
      let (domain, _) = require_word(rest, "domain", usage)?;
      Action::Invalidate(parse_domain(domain)?)
    }
    "clear-all" => Action::ClearAll,
    "stats" => Action::Stats,
    "domains" => Action::Domains,
    "rules" => {
      let (domain, _) = next_word(rest);
      Action::Rules(if domain.is_empty() {
        None
      } else {
        Some(parse_domain(domain)?)
      })
    }
    "status" => Action::Status,
    "help" => Action::Help,
    "quit" => Action::Quit,
    other => return Err(eyre!("Command '{}' is not handled by the console", other)),
  };
  Ok(Some(action))
}

fn format_age(age: Duration) -> String {
  let secs = age.as_secs();
  if secs < 60 {
    format!("{}s", secs)
  } else {
    format!("{}m{:02}s", secs / 60, secs % 60)
  }
}

fn provenance<T>(result: &CacheResult<T>) -> String {
  match result.age {
    Some(age) => format!("{}, {} old", result.source.label(), format_age(age)),
    None => result.source.label().to_string(),
  }
}

/// Turn a failed command into an error notice, with a hint for rejected credentials.
fn failure_notice(err: &color_eyre::Report) -> Notification {
  let unauthorized = err
    .chain()
    .filter_map(|cause| cause.downcast_ref::<ApiError>())
    .any(ApiError::is_unauthorized);
  if unauthorized {
    Notification::error(format!("{} (check ERPQ_TOKEN)", err))
  } else {
    Notification::error(err.to_string())
  }
}

fn render(notice: &Notification) -> String {
  let label = match notice.level {
    NotificationLevel::Info => "info",
    NotificationLevel::Warning => "warning",
    NotificationLevel::Error => "error",
  };
  format!("[{}] {}", label, notice.message)
}

fn pretty(value: &Value) -> String {
  serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Interactive console over the cached ERP client
pub struct App {
  config: Config,
  session: Session,
  store: Arc<CacheStore>,
  erp: CachedErpClient,
  trigger: ClearAllTrigger,
  push_state: Option<ChannelState>,
  no_push: bool,
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, no_push: bool) -> Result<Self> {
    let token = match Config::get_api_token() {
      Ok(token) => Some(token),
      Err(err) => {
        tracing::warn!(error = %err, "Running without an API token");
        None
      }
    };

    let store = Arc::new(CacheStore::new(config.cache.policy()));
    let client = ErpClient::new(&config.api, token)?;
    let erp = CachedErpClient::new(
      client.clone(),
      Arc::clone(&store),
      Arc::new(RuleTable::standard()),
    );
    let trigger = ClearAllTrigger::new(client, Arc::clone(&store), config.admin.elevated_role.clone());
    let session = Session::new(config.session.user.clone(), config.session.role.clone());

    Ok(Self {
      config,
      session,
      store,
      erp,
      trigger,
      push_state: None,
      no_push,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new();
    let push = self.start_push(&events)?;

    println!(
      "erpq connected to {} as {} ({}). Type 'help' for commands.",
      self.config.api.base_url,
      self.session.user.as_deref().unwrap_or("anonymous"),
      self.session.role
    );
    prompt();

    while !self.should_quit {
      let Some(event) = events.next().await else {
        break;
      };
      self.handle_event(event).await;
    }

    for handle in push {
      handle.abort();
    }
    Ok(())
  }

  /// Spawn the push channel and a task forwarding its state changes.
  fn start_push(&mut self, events: &EventHandler) -> Result<Vec<JoinHandle<()>>> {
    if self.no_push || !self.config.push.enabled {
      tracing::info!("Push channel disabled");
      return Ok(Vec::new());
    }

    let url = self.config.api.push_url()?;
    let token = Config::get_api_token().ok();
    let tx = events.sender();
    let notifier = Arc::new(move |notification: Notification| {
      let _ = tx.send(Event::Notice(notification));
    });

    let channel = PushChannel::new(WsConnector::new(url, token), Arc::clone(&self.store), notifier)
      .with_reconnect_delay(self.config.push.reconnect_delay())
      .with_notify_after_failures(self.config.push.notify_after_failures);
    let mut state = channel.subscribe();
    self.push_state = Some(*state.borrow());

    let tx = events.sender();
    let forward = tokio::spawn(async move {
      while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        if tx.send(Event::PushState(current)).is_err() {
          break;
        }
      }
    });

    Ok(vec![channel.spawn(), forward])
  }

  async fn handle_event(&mut self, event: Event) {
    match event {
      Event::Input(line) => {
        match parse_line(&line) {
          Ok(Some(action)) => {
            if let Err(err) = self.execute(action).await {
              println!("{}", render(&failure_notice(&err)));
            }
          }
          Ok(None) => {}
          Err(err) => println!("{}", err),
        }
        if !self.should_quit {
          prompt();
        }
      }
      Event::Eof => self.should_quit = true,
      Event::Notice(notice) => {
        println!("\n{}", render(&notice));
        prompt();
      }
      Event::PushState(state) => {
        let previous = self.push_state.replace(state);
        tracing::debug!(?previous, %state, "Push state changed");
      }
    }
  }

  async fn execute(&mut self, action: Action) -> Result<()> {
    match action {
      Action::Get { domain, id, query } => {
        let result = match id {
          Some(id) => self.erp.get(domain, &id).await?,
          None => self.erp.list_or_stale(domain, &query).await?,
        };
        println!("({})", provenance(&result));
        println!("{}", pretty(&result.data));
      }
      Action::Create { domain, body } => {
        let created = self.erp.create(domain, &body).await?;
        println!("Created in {}:\n{}", domain, pretty(&created));
      }
      Action::Update { domain, id, body } => {
        let updated = self.erp.update(domain, &id, &body).await?;
        println!("Updated {}/{}:\n{}", domain, id, pretty(&updated));
      }
      Action::Delete { domain, id } => {
        self.erp.delete(domain, &id).await?;
        println!("Deleted {}/{}", domain, id);
      }
      Action::Review { id, review } => {
        self.erp.review_expense(&id, &review).await?;
        let verdict = match review.status {
          ReviewStatus::Approved => "approved",
          ReviewStatus::Rejected => "rejected",
        };
        println!("Expense {} {}", id, verdict);
      }
      Action::Invalidate(domain) => {
        let removed = self.erp.cache().invalidate(&KeyPattern::Tag(domain));
        println!("Dropped {} cached {} entries", removed, domain);
      }
      Action::ClearAll => match self.trigger.trigger(&self.session).await {
        Ok(removed) => println!(
          "Cleared {} local entries and asked every client to clear its cache",
          removed
        ),
        Err(err @ TriggerError::Forbidden { .. }) => println!("{}", err),
        Err(err) => return Err(err.into()),
      },
      Action::Stats => self.print_stats(),
      Action::Domains => {
        for domain in Domain::ALL {
          let kind = if domain.is_aggregate() {
            "read-only"
          } else {
            ""
          };
          println!("  {:<26} /{:<30} {}", domain.tag(), domain.path(), kind);
        }
      }
      Action::Rules(filter) => {
        for (event, patterns) in self.erp.dispatcher().rules().iter() {
          if filter.is_some_and(|d| d != event.domain) {
            continue;
          }
          // All operations of a domain share one rule; show it once.
          if event.operation != Operation::Create {
            continue;
          }
          let targets: Vec<String> = patterns.iter().map(ToString::to_string).collect();
          println!("  {:<26} -> {}", event.domain, targets.join(", "));
        }
      }
      Action::Status => {
        println!(
          "user: {}  role: {}  admin: {}",
          self.session.user.as_deref().unwrap_or("anonymous"),
          self.session.role,
          if self.trigger.is_permitted(&self.session) {
            "yes"
          } else {
            "no"
          }
        );
        match self.push_state {
          Some(state) => println!("push channel: {}", state),
          None => println!("push channel: disabled"),
        }
        println!("in-flight requests: {}", self.erp.cache().in_flight());
      }
      Action::Help => {
        for command in COMMANDS {
          println!("  {:<46} {}", command.usage, command.description);
        }
      }
      Action::Quit => self.should_quit = true,
    }
    Ok(())
  }

  fn print_stats(&self) {
    let stats = self.store.stats();
    println!(
      "entries: {}  hits: {}  misses: {}  invalidated: {}  cleared: {}  evicted: {}",
      self.store.len(),
      stats.hits,
      stats.misses,
      stats.invalidated,
      stats.cleared,
      stats.evicted
    );
    for key in self.store.keys() {
      if let Some(entry) = self.store.peek(&key) {
        let state = if entry.is_fresh(tokio::time::Instant::now()) {
          "fresh"
        } else {
          "stale"
        };
        println!("  {:<48} {:<6} {}", key.to_string(), state, format_age(entry.age()));
      }
    }
  }
}

fn prompt() {
  print!("erpq> ");
  let _ = std::io::stdout().flush();
}
