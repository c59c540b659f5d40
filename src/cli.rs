//! Command-line interface implementation.

use crate::crypto::KdfParams;
use crate::error::{PassTreeError, Result};
use crate::reconstruct;
use crate::record::RecordStream;
use crate::sealed::SealedLibrary;
use crate::security::ClipboardManager;
use crate::session::{SessionHandle, SessionManager};
use crate::tree::{Node, NodeId};
use crate::utils::{self, success, warning, NodeSelector};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Environment variable read for a non-interactive password.
pub const PASSWORD_ENV: &str = "PASSTREE_PASSWORD";

/// Password attempts per file before giving up.
const MAX_ATTEMPTS: usize = 3;

/// Browse encrypted password databases as a tree.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by PASSTREE_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open one or more databases and print their trees
    Show {
        /// Database files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the tree path of every node
        #[arg(short, long)]
        paths: bool,
    },

    /// Seal a JSON record stream into a new database
    Create {
        /// JSON file with `groups` and `entries`
        #[arg(long, value_name = "RECORDS")]
        from: PathBuf,

        /// Database file to write
        output: PathBuf,

        /// Overwrite the output if it exists
        #[arg(short, long)]
        force: bool,

        /// Argon2id memory cost in KiB
        #[arg(long, default_value_t = KdfParams::default().memory_kib)]
        kdf_memory: u32,

        /// Argon2id iterations
        #[arg(long, default_value_t = KdfParams::default().iterations)]
        kdf_iterations: u32,
    },

    /// Copy the password (or username) of an entry to the clipboard
    Copy {
        /// Database file
        file: PathBuf,

        /// Entry as `Group/Sub/Title` or a tree path such as `0:1:0`
        entry: String,

        /// Copy the username instead of the password
        #[arg(short, long)]
        username: bool,

        /// Clear the clipboard after N seconds
        #[arg(
            short = 't',
            long,
            env = "PASSTREE_CLIPBOARD_TIMEOUT",
            default_value = "10"
        )]
        timeout: u64,
    },
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Show { files, paths } => self.show(files, *paths),
            Commands::Create {
                from,
                output,
                force,
                kdf_memory,
                kdf_iterations,
            } => self.create(
                from,
                output,
                *force,
                KdfParams {
                    memory_kib: *kdf_memory,
                    iterations: *kdf_iterations,
                    ..KdfParams::default()
                },
            ),
            Commands::Copy {
                file,
                entry,
                username,
                timeout,
            } => self.copy(file, entry, *username, *timeout).await,
        }
    }

    /// Open every file and print the merged tree.
    fn show(&self, files: &[PathBuf], paths: bool) -> anyhow::Result<()> {
        let mut manager = SessionManager::default();

        for file in files {
            open_database(&mut manager, file)
                .with_context(|| format!("failed to open {}", file.display()))?;
        }

        let container = manager.container();
        for &root in container.roots() {
            for line in utils::format_tree(container, root, paths) {
                println!("{line}");
            }
        }

        manager.close_all();
        Ok(())
    }

    /// Seal a plain record stream into a new database file.
    fn create(
        &self,
        from: &Path,
        output: &Path,
        force: bool,
        kdf: KdfParams,
    ) -> anyhow::Result<()> {
        if output.exists() && !force {
            anyhow::bail!(
                "{} already exists. Use --force to overwrite.",
                output.display()
            );
        }
        kdf.validate().map_err(PassTreeError::from)?;

        let content = Zeroizing::new(
            fs::read_to_string(from)
                .with_context(|| format!("failed to read records from {}", from.display()))?,
        );
        let stream: RecordStream = serde_json::from_str(&content)
            .with_context(|| format!("invalid record stream in {}", from.display()))?;

        // Refuse to write a database that could never be opened.
        let forest = reconstruct::build(stream.clone()).map_err(PassTreeError::from)?;
        for dropped in forest.dropped() {
            warning(&dropped.to_string());
        }

        let password = match env_password() {
            Some(password) => password,
            None => prompt_password_with_confirmation("Enter password for the new database")?,
        };

        SealedLibrary::with_params(kdf).write(output, &stream, &password)?;
        success(&format!(
            "Database written to {} ({} groups, {} entries)",
            output.display(),
            forest.group_count(),
            forest.entry_count()
        ));

        for warn in utils::check_file_permissions(output) {
            warning(&warn);
        }
        Ok(())
    }

    /// Copy an entry field to the clipboard for a limited time.
    async fn copy(
        &self,
        file: &Path,
        entry: &str,
        username: bool,
        timeout: u64,
    ) -> anyhow::Result<()> {
        let mut manager = SessionManager::default();
        let handle = open_database(&mut manager, file)
            .with_context(|| format!("failed to open {}", file.display()))?;

        let node = select_node(&manager, &handle, entry)?;
        let Some(Node::Entry(found)) = manager.container().get(node) else {
            return Err(PassTreeError::NodeNotFound(format!("{entry} is not an entry")).into());
        };

        let (field, value) = if username {
            ("Username", found.username.as_str())
        } else {
            ("Password", found.password.expose())
        };

        if value.is_empty() {
            warning(&format!("{field} of {} is empty, nothing copied", found.title));
        } else {
            success(&format!(
                "{field} copied to clipboard (clears in {timeout} seconds)"
            ));
            ClipboardManager::copy_for(value, timeout).await?;
        }

        manager.close_all();
        Ok(())
    }
}

/// Open a database, prompting for the password. Wrong passwords are
/// retried a few times unless the password comes from the environment.
fn open_database(manager: &mut SessionManager, path: &Path) -> Result<SessionHandle> {
    let handle = match env_password() {
        Some(password) => manager.open(path, &password)?,
        None => {
            let mut attempt = 1;
            loop {
                let password = prompt_password(&format!("Password for {}", path.display()))?;
                match manager.open(path, &password) {
                    Ok(handle) => break handle,
                    Err(e) if e.is_decryption_failure() && attempt < MAX_ATTEMPTS => {
                        warning(&e.to_string());
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    };

    for dropped in &handle.dropped {
        warning(&dropped.to_string());
    }
    Ok(handle)
}

fn select_node(manager: &SessionManager, handle: &SessionHandle, entry: &str) -> Result<NodeId> {
    let container = manager.container();
    let found = match utils::parse_node_selector(entry) {
        NodeSelector::Path(path) => container
            .node_at(&path)
            .filter(|&id| container.owning_root(id) == Some(handle.root)),
        NodeSelector::Names(names) => container.resolve(handle.root, &names),
    };
    found.ok_or_else(|| PassTreeError::NodeNotFound(entry.to_string()))
}

fn env_password() -> Option<Zeroizing<String>> {
    std::env::var(PASSWORD_ENV).ok().map(Zeroizing::new)
}

fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    use dialoguer::Password;

    Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()
        .map(Zeroizing::new)
        .map_err(|e| PassTreeError::Other(e.to_string()))
}

fn prompt_password_with_confirmation(prompt: &str) -> Result<Zeroizing<String>> {
    let password = prompt_password(prompt)?;
    if password.is_empty() {
        return Err(PassTreeError::Cancelled);
    }

    let confirm = prompt_password("Confirm password")?;
    if *password != *confirm {
        return Err(PassTreeError::PasswordMismatch);
    }

    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_copy_defaults() {
        let cli = Cli::try_parse_from(["passtree", "copy", "db.ptdb", "Internet/Mail"]).unwrap();
        match cli.command {
            Commands::Copy {
                file,
                entry,
                username,
                timeout,
            } => {
                assert_eq!(file, PathBuf::from("db.ptdb"));
                assert_eq!(entry, "Internet/Mail");
                assert!(!username);
                if std::env::var("PASSTREE_CLIPBOARD_TIMEOUT").is_err() {
                    assert_eq!(timeout, 10);
                }
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_show_requires_files() {
        assert!(Cli::try_parse_from(["passtree", "show"]).is_err());
    }
}
