//! Interactive REPL.

use crate::commands::{
    format_excerpts, format_json, format_keywords, format_result_set, format_status, parse_mode,
    parse_update_rows,
};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use sphinx_client::Client;
use sphinx_protocol::{ExcerptOptions, QuerySpec};

const HELP_TEXT: &str = r#"
Available commands:
  help                              Show this help
  status                            Show the server status table

  query <index> <text...>           Run a query ('*' searches every index)
  mode <match_mode>                 Set the match mode (all, any, extended2, ...)
  limit <n> [offset]                Set the result window
  weights <field=w>...              Set field weights
  select <expr...>                  Set the select list
  reset                             Reset query settings

  keywords <index> <text...>        Tokenize text
  hits <index> <text...>            Tokenize text with statistics
  excerpt <index> <words> <doc...>  Highlight words in a document
  update <index> <attr> <id=v>...   Update an attribute, e.g. update test1 group_id 2=22

  json                              Toggle JSON output
  quit, exit                        Exit the REPL
"#;

struct Session {
    client: Client,
    spec: QuerySpec,
    json: bool,
}

pub async fn run(client: Client, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "sphinx CLI".bold().cyan());

    let mut session = Session {
        client,
        spec: QuerySpec::new(),
        json,
    };

    // A persistent connection is an optimization; fall back to per-call connects
    match session.client.open().await {
        Ok(()) => println!("{}", "Connected!".green()),
        Err(e) => println!(
            "{}: {} (commands will connect on demand)",
            "Warning".yellow(),
            e
        ),
    }

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".sphinx_history"))
        .unwrap_or_else(|_| ".sphinx_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "sphinx>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&mut session, line).await {
                    Ok(Some(output)) => {
                        println!("{}", output);
                        if !session.client.last_warning().is_empty() {
                            println!(
                                "{}: {}",
                                "Warning".yellow(),
                                session.client.last_warning()
                            );
                        }
                        println!();
                    }
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = session.client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    session: &mut Session,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];
    let client = &mut session.client;

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "json" => {
            session.json = !session.json;
            Ok(Some(format!(
                "JSON output {}",
                if session.json { "on" } else { "off" }
            )))
        }

        "status" | "s" => {
            let rows = client.status().await?;
            if session.json {
                return Ok(Some(format_json(&rows)?));
            }
            Ok(Some(format_status(&rows)))
        }

        "query" | "search" => {
            if args.is_empty() {
                return Ok(Some("Usage: query <index> <text...>".to_string()));
            }
            let index = args[0];
            let text = args[1..].join(" ");
            let result = client.query(&text, index, &session.spec).await?;
            if session.json {
                return Ok(Some(format_json(&result)?));
            }
            Ok(Some(format_result_set(&text, &result)))
        }

        "mode" => {
            if args.is_empty() {
                return Ok(Some("Usage: mode <match_mode>".to_string()));
            }
            session.spec.set_match_mode(parse_mode(args[0])?);
            Ok(Some(format!("Match mode set to {}", args[0].cyan())))
        }

        "limit" => {
            if args.is_empty() {
                return Ok(Some("Usage: limit <n> [offset]".to_string()));
            }
            let limit: u32 = args[0].parse()?;
            let offset: u32 = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(0);
            let max_matches = session
                .spec
                .max_matches
                .max(offset.saturating_add(limit));
            session.spec.set_limits(offset, limit, max_matches, 0)?;
            Ok(Some(format!("Window set to {}..+{}", offset, limit)))
        }

        "weights" => {
            let weights = args
                .iter()
                .map(|w| crate::commands::parse_weight(w))
                .collect::<Result<Vec<_>, _>>()?;
            session.spec.set_field_weights(weights);
            Ok(Some("Field weights set".to_string()))
        }

        "select" => {
            let select = if args.is_empty() {
                "*".to_string()
            } else {
                args.join(" ")
            };
            session.spec.set_select(select);
            Ok(Some("Select list set".to_string()))
        }

        "reset" => {
            session.spec = QuerySpec::new();
            Ok(Some("Query settings reset".to_string()))
        }

        "keywords" | "kw" | "hits" => {
            if args.len() < 2 {
                return Ok(Some(format!("Usage: {} <index> <text...>", cmd)));
            }
            let hits = cmd == "hits";
            let keywords = client
                .build_keywords(&args[1..].join(" "), args[0], hits)
                .await?;
            if session.json {
                return Ok(Some(format_json(&keywords)?));
            }
            Ok(Some(format_keywords(&keywords)))
        }

        "excerpt" | "ex" => {
            if args.len() < 3 {
                return Ok(Some(
                    "Usage: excerpt <index> <words> <document text...>".to_string(),
                ));
            }
            let doc = args[2..].join(" ");
            let excerpts = client
                .build_excerpts(&[doc], args[0], args[1], &ExcerptOptions::default())
                .await?;
            if session.json {
                return Ok(Some(format_json(&excerpts)?));
            }
            Ok(Some(format_excerpts(&excerpts)))
        }

        "update" | "u" => {
            if args.len() < 3 {
                return Ok(Some(
                    "Usage: update <index> <attr> <docid=value>...".to_string(),
                ));
            }
            let values = parse_update_rows(args[2..].iter().copied())?;
            let updated = client.update_attributes(args[0], &[args[1]], &values).await?;
            Ok(Some(format!(
                "{} {} document(s)",
                "Updated".green(),
                updated
            )))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}
