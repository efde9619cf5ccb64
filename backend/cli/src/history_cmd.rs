//! `visiongrab history`: browse and edit recorded results.

use anyhow::{bail, Result};
use clap::Subcommand;
use uuid::Uuid;
use visiongrab_history::HistoryStore;

use crate::app::App;
use crate::terminal_output::{dim, note_success, render_table};

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List recent entries, newest first (the default)
    List,
    /// Print one entry in full
    Show { id: Uuid },
    /// Replace the recorded text of an entry
    Edit {
        id: Uuid,
        #[arg(short, long)]
        content: String,
    },
    /// Remove an entry
    Delete { id: Uuid },
    /// Export entries as JSON
    Export,
}

pub fn run(app: &App, cmd: Option<HistoryCommands>, limit: usize) -> Result<()> {
    let store = &app.history;
    match cmd.unwrap_or(HistoryCommands::List) {
        HistoryCommands::List => print!("{}", list_table(store, limit)?),
        HistoryCommands::Show { id } => {
            let Some(entry) = store.get(&id)? else {
                bail!("No history entry {id}");
            };
            println!(
                "{}",
                dim(&format!(
                    "{} | {} | {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.model_name,
                    entry.prompt
                ))
            );
            println!("{}", entry.content);
        }
        HistoryCommands::Edit { id, content } => {
            let Some(mut entry) = store.get(&id)? else {
                bail!("No history entry {id}");
            };
            entry.content = content;
            store.update(&entry)?;
            note_success(&format!("Updated {id}"));
        }
        HistoryCommands::Delete { id } => {
            if !store.delete(&id)? {
                bail!("No history entry {id}");
            }
            note_success(&format!("Deleted {id}"));
        }
        HistoryCommands::Export => {
            let entries = store.list(Some(limit))?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}

fn list_table(store: &HistoryStore, limit: usize) -> Result<String> {
    let entries = store.list(Some(limit))?;
    if entries.is_empty() {
        return Ok("No history yet.\n".to_string());
    }
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.id.to_string(),
                e.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                e.model_name.clone(),
                e.content.clone(),
            ]
        })
        .collect();
    Ok(render_table(
        &["ID", "When", "Model", "Content"],
        &rows,
        &[36, 16, 14, 60],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use visiongrab_config::AppSettings;
    use visiongrab_core::{ProcessingResult, ResultSink};

    #[test]
    fn lists_newest_first() {
        let store = HistoryStore::in_memory().unwrap();
        assert_eq!(list_table(&store, 10).unwrap(), "No history yet.\n");

        store.deliver(&ProcessingResult::new("first text", "p", "Gemini"));
        store.deliver(&ProcessingResult::new("second text", "p", "Relay Server"));

        let table = list_table(&store, 10).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("second text"));
        assert!(lines[3].contains("first text"));
    }

    #[tokio::test]
    async fn edit_and_delete_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::build(dir.path(), AppSettings::default()).unwrap();
        app.history
            .deliver(&ProcessingResult::new("orignal", "p", "Llama"));
        let id = app.history.list(None).unwrap()[0].id;

        run(
            &app,
            Some(HistoryCommands::Edit {
                id,
                content: "original".to_string(),
            }),
            20,
        )
        .unwrap();
        assert_eq!(app.history.get(&id).unwrap().unwrap().content, "original");

        run(&app, Some(HistoryCommands::Delete { id }), 20).unwrap();
        assert_eq!(app.history.count().unwrap(), 0);
        assert!(run(&app, Some(HistoryCommands::Delete { id }), 20).is_err());
    }
}
