//! Document commands over a file-backed repo

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use verso_core::config::Config;
use verso_core::error::{Result, VersoError};
use verso_core::migration::{self, Migration};
use verso_core::repo::{FileStorage, Repo};
use verso_core::{ChangeId, DocHandle, DocumentId};

use crate::cli::args::DocCommands;

/// Open a network-less repo over the store at `data_dir`.
pub fn open_repo(data_dir: &Path, config: &Config) -> Result<Repo> {
    log::debug!("[CLI] Opening store at {}", data_dir.display());
    let storage = FileStorage::open(data_dir)?;
    Ok(Repo::new(Arc::new(storage), config.repo_config()))
}

/// Schema steps this binary can apply. None are registered yet.
const MIGRATIONS: &[Migration] = &[];

/// Run a `doc` subcommand. Returns false after printing the error.
///
/// `target` is the configured schema version `show` upgrades documents to.
pub fn handle_doc_command(command: DocCommands, repo: &Repo, target: Option<u32>) -> bool {
    let result = match command {
        DocCommands::Create { json } => create(repo, json).map(|address| println!("{}", address)),
        DocCommands::Show { address, at } => show(repo, &address, at.as_deref(), target).and_then(|v| {
            println!("{}", serde_json::to_string_pretty(&v)?);
            Ok(())
        }),
        DocCommands::Heads { address } => heads(repo, &address).map(|id| {
            println!("{}", id);
            println!("url: {}", id.url_encode());
        }),
        DocCommands::List => list(repo).map(|ids| {
            if ids.is_empty() {
                println!("No documents in store.");
            }
            for id in ids {
                println!("{}", id.address());
            }
        }),
        DocCommands::Delete { address } => repo
            .delete(&address)
            .map(|()| println!("✓ Deleted {}", address)),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            log::debug!("[CLI] Command failed: {:?}", e);
            eprintln!("✗ {}", e);
            false
        }
    }
}

fn create(repo: &Repo, json: Option<PathBuf>) -> Result<String> {
    let initial = match json {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| VersoError::FileRead { path, source: e })?;
            serde_json::from_str(&text)?
        }
        None => Value::Object(Default::default()),
    };
    Ok(repo.create(&initial)?.address())
}

/// A stored document's handle. Without a network nothing can arrive later,
/// so a document missing from storage is an error here. Storage is only read.
fn open(repo: &Repo, address: &str) -> Result<DocHandle<Value>> {
    let handle = repo.find::<Value>(address)?;
    if !handle.is_ready() {
        log::warn!("[CLI] {} is not in the store", address);
        return Err(VersoError::NotReady(handle.address()));
    }
    Ok(handle)
}

/// The document as JSON. The current state is upgraded to `target` first,
/// without writing the upgrade back; past states are shown as they were.
fn show(repo: &Repo, address: &str, at: Option<&str>, target: Option<u32>) -> Result<Value> {
    let handle = open(repo, address)?;
    let artifact = match (at, target) {
        (Some(at), _) => handle.view(&ChangeId::from_url_param(at)?)?,
        (None, Some(target)) => {
            let current = handle.doc()?;
            log::debug!(
                "[CLI] {} is at schema {}, target {}",
                address,
                current.schema_version(),
                target
            );
            migration::migrate_if_needed(&current, MIGRATIONS, target)?
        }
        (None, None) => handle.doc()?,
    };
    artifact.to_json()
}

fn heads(repo: &Repo, address: &str) -> Result<ChangeId> {
    Ok(open(repo, address)?.change_id())
}

fn list(repo: &Repo) -> Result<Vec<DocumentId>> {
    repo.stored()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verso_core::repo::ArtifactStorage;

    fn repo(temp: &TempDir) -> Repo {
        open_repo(temp.path(), &Config::new(temp.path().to_path_buf())).unwrap()
    }

    #[test]
    fn test_create_from_json_file_then_show() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("initial.json");
        std::fs::write(&file, r#"{"title": "Plan"}"#).unwrap();

        let repo = repo(&temp);
        let address = create(&repo, Some(file)).unwrap();
        assert_eq!(show(&repo, &address, None, None).unwrap()["title"], "Plan");
        assert_eq!(list(&repo).unwrap().len(), 1);
    }

    #[test]
    fn test_show_at_earlier_heads() {
        use automerge::ROOT;
        use automerge::transaction::Transactable;

        let temp = TempDir::new().unwrap();
        let repo = repo(&temp);
        let address = create(&repo, None).unwrap();
        let handle = repo.find::<Value>(&address).unwrap();

        handle.change(|tx| tx.put(ROOT, "count", 1_i64)).unwrap();
        let before = heads(&repo, &address).unwrap();
        handle.change(|tx| tx.put(ROOT, "count", 2_i64)).unwrap();

        let then = show(&repo, &address, Some(&before.url_encode()), None).unwrap();
        assert_eq!(then["count"], 1);
        assert_eq!(show(&repo, &address, None, None).unwrap()["count"], 2);
        assert_eq!(
            show(&repo, &address, Some("uncommitted"), None).unwrap()["count"],
            2
        );
    }

    #[test]
    fn test_missing_document_is_not_ready() {
        let temp = TempDir::new().unwrap();
        let repo = repo(&temp);
        assert!(matches!(
            show(&repo, "doc:missing", None, None),
            Err(VersoError::NotReady(_))
        ));
        assert!(list(&repo).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_document_is_reported_and_kept() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        let id = DocumentId::parse("doc:precious").unwrap();
        storage.save(&id, b"not an automerge document").unwrap();
        let path = storage.path_for(&id);

        let repo = repo(&temp);
        assert!(matches!(
            show(&repo, "doc:precious", None, None),
            Err(VersoError::CorruptDocument { .. })
        ));
        assert!(heads(&repo, "doc:precious").is_err());
        assert!(path.exists());
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"not an automerge document".to_vec()
        );
    }

    #[test]
    fn test_show_checks_target_schema_version() {
        let temp = TempDir::new().unwrap();
        let repo = repo(&temp);
        let address = create(&repo, None).unwrap();

        assert_eq!(
            show(&repo, &address, None, Some(1)).unwrap()["schemaVersion"],
            1
        );
        assert!(matches!(
            show(&repo, &address, None, Some(2)),
            Err(VersoError::MissingMigration(1))
        ));
        assert_eq!(
            show(&repo, &address, None, None).unwrap()["schemaVersion"],
            1
        );
    }

    #[test]
    fn test_create_rejects_non_object_json() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("list.json");
        std::fs::write(&file, "[1, 2, 3]").unwrap();
        let repo = repo(&temp);
        assert!(matches!(
            create(&repo, Some(file)),
            Err(VersoError::InvalidPayload(_))
        ));
        assert!(list(&repo).unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_invalid_json() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("bad.json");
        std::fs::write(&file, "{").unwrap();
        assert!(matches!(
            create(&repo(&temp), Some(file)),
            Err(VersoError::Payload(_))
        ));
    }
}
