//! Interactive diagnostic session.
//!
//! One line per command. The orchestrator's guards decide what is allowed;
//! the loop only mirrors the enabled/disabled state the UI would show.

use std::io::Write as _;

use faultscope_core::models::FeedbackRating;
use faultscope_core::WorkflowOrchestrator;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render;

const HELP: &str = "\
Commands:
  files                 list uploaded logs
  upload <path>         upload, preview and index a log
  select <file>         switch to an uploaded log (empty clears)
  preview               show the current preview
  row <n>               copy preview row n into the query
  query <text>          set the query text
  ask                   submit the current query
  rate <rating>         rate the result (good, can_be_better, bad)
  kb                    show/hide the knowledge-base browser
  cd <dir>              enter a subdirectory
  up                    go to the parent directory
  path <path>           type a path (applied on 'commit')
  commit                apply the typed path
  reindex               index documents under the current path
  status                show session state
  help                  show this help
  quit                  leave the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Files,
    Upload(String),
    Select(String),
    Preview,
    Row(usize),
    Query(String),
    Ask,
    Rate(FeedbackRating),
    Kb,
    Cd(String),
    Up,
    Path(String),
    Commit,
    Reindex,
    Status,
    Help,
    Quit,
}

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let need_arg = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("'{}' needs {}", word, what))
        } else {
            Ok(rest.to_string())
        }
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "files" | "ls" => ReplCommand::Files,
        "upload" => ReplCommand::Upload(need_arg("a file path")?),
        "select" | "open" => ReplCommand::Select(rest.to_string()),
        "preview" => ReplCommand::Preview,
        "row" => {
            let n = need_arg("a row number")?;
            let index = n
                .parse::<usize>()
                .map_err(|_| format!("'{}' is not a row number", n))?;
            ReplCommand::Row(index)
        }
        "query" | "q" => ReplCommand::Query(rest.to_string()),
        "ask" => ReplCommand::Ask,
        "rate" => ReplCommand::Rate(need_arg("a rating")?.parse()?),
        "kb" => ReplCommand::Kb,
        "cd" => ReplCommand::Cd(need_arg("a directory name")?),
        "up" | ".." => ReplCommand::Up,
        "path" => ReplCommand::Path(rest.to_string()),
        "commit" => ReplCommand::Commit,
        "reindex" => ReplCommand::Reindex,
        "status" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(cmd))
}

pub async fn run(flow: &mut WorkflowOrchestrator) -> anyhow::Result<()> {
    println!("faultscope session. Type 'help' for commands.");
    if let Err(e) = flow.refresh_files().await {
        eprintln!("! {}", e);
    }

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    loop {
        print!("faultscope> ");
        std::io::stdout().flush()?;

        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::debug!("EOF on stdin, leaving session");
            break;
        }
        let cmd = match parse_line(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("! {}", msg);
                continue;
            }
        };
        if cmd == ReplCommand::Quit {
            break;
        }
        if let Err(e) = execute(flow, cmd).await {
            eprintln!("! {}", e);
        }
    }

    flow.drain_background().await;
    Ok(())
}

async fn execute(flow: &mut WorkflowOrchestrator, cmd: ReplCommand) -> anyhow::Result<()> {
    match cmd {
        ReplCommand::Files => {
            flow.refresh_files().await?;
            print!("{}", render::files(flow.session().files()));
        }
        ReplCommand::Upload(path) => {
            let (name, contents) = crate::read_upload(&path)?;
            let stored = flow.upload(&name, contents).await?;
            println!("{} ready", stored);
            print!("{}", render::preview(flow.session().preview()));
        }
        ReplCommand::Select(file) => {
            flow.select_file(&file).await?;
            print!("{}", render::preview(flow.session().preview()));
        }
        ReplCommand::Preview => print!("{}", render::preview(flow.session().preview())),
        ReplCommand::Row(index) => {
            flow.select_row(index)?;
            println!("Query: {}", flow.session().query());
        }
        ReplCommand::Query(text) => flow.set_query(text),
        ReplCommand::Ask => {
            if !flow.session().can_query() {
                println!("Nothing to ask. Set a query with 'row' or 'query' first.");
                return Ok(());
            }
            if flow.query().await? {
                if let Some(result) = flow.session().result() {
                    print!("{}", render::diagnosis(result));
                }
            }
        }
        ReplCommand::Rate(rating) => {
            if !flow.session().can_submit_feedback() {
                println!("Rating is not available for the current result.");
                return Ok(());
            }
            flow.submit_feedback(rating).await?;
            println!("{}", flow.session().status());
        }
        ReplCommand::Kb => {
            if flow.toggle_browser().await {
                print!("{}", render::browser(flow.browser()));
            } else {
                println!("Knowledge-base browser hidden.");
            }
        }
        ReplCommand::Cd(dir) => {
            flow.navigate_into(&dir).await;
            print!("{}", render::browser(flow.browser()));
        }
        ReplCommand::Up => {
            flow.navigate_up().await;
            print!("{}", render::browser(flow.browser()));
        }
        ReplCommand::Path(path) => {
            flow.edit_kb_path(&path);
            println!("Path set to {} (type 'commit' to list it)", flow.browser().current_path());
        }
        ReplCommand::Commit => {
            if flow.commit_kb_path().await {
                print!("{}", render::browser(flow.browser()));
            }
        }
        ReplCommand::Reindex => {
            if !flow.browser().can_reindex() {
                println!("No documents detected under {}.", flow.browser().current_path());
                return Ok(());
            }
            flow.reindex_knowledge_base().await?;
            println!("{}", flow.session().status());
            print!("{}", render::browser(flow.browser()));
        }
        ReplCommand::Status => print!("{}", render::status(flow.session())),
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Quit => {}
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // TEST 1: Commands with arguments keep the whole remainder
    // ========================================================================
    #[test]
    fn test_parse_keeps_argument_text() {
        assert_eq!(
            parse_line("query  E102 Vacuum loss ").unwrap(),
            Some(ReplCommand::Query("E102 Vacuum loss".to_string()))
        );
        assert_eq!(
            parse_line("upload logs/line 3.csv").unwrap(),
            Some(ReplCommand::Upload("logs/line 3.csv".to_string()))
        );
    }

    // ========================================================================
    // TEST 2: Row numbers and ratings are validated
    // ========================================================================
    #[test]
    fn test_parse_validates_arguments() {
        assert_eq!(parse_line("row 2").unwrap(), Some(ReplCommand::Row(2)));
        assert!(parse_line("row two").is_err());
        assert!(parse_line("row").is_err());
        assert_eq!(
            parse_line("rate can be better").unwrap(),
            Some(ReplCommand::Rate(FeedbackRating::CanBeBetter))
        );
        assert!(parse_line("rate excellent").is_err());
    }

    // ========================================================================
    // TEST 3: Blank lines and unknown commands
    // ========================================================================
    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(parse_line("   ").unwrap(), None);
        let err = parse_line("frobnicate").unwrap_err();
        assert!(err.contains("unknown command 'frobnicate'"));
    }

    // ========================================================================
    // TEST 4: Select and path accept an empty argument
    // ========================================================================
    #[test]
    fn test_parse_empty_select_and_path() {
        assert_eq!(parse_line("select").unwrap(), Some(ReplCommand::Select(String::new())));
        assert_eq!(parse_line("path").unwrap(), Some(ReplCommand::Path(String::new())));
        assert_eq!(parse_line("..").unwrap(), Some(ReplCommand::Up));
        assert_eq!(parse_line("QUIT").unwrap(), Some(ReplCommand::Quit));
    }
}
