//! Terminal helpers for the command-line front end.

use crate::order::SiblingOrder;
use crate::tree::{Node, NodeId, TreeContainer, TreePath};
use colored::*;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// How a command line names a node: by display-order position or by the
/// display names leading to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelector {
    Path(TreePath),
    Names(Vec<String>),
}

/// Parse `0:1:2` as a tree path and anything else as `Group/Sub/Entry`.
pub fn parse_node_selector(input: &str) -> NodeSelector {
    if let Ok(path) = input.parse::<TreePath>() {
        return NodeSelector::Path(path);
    }
    NodeSelector::Names(
        input
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect(),
    )
}

/// Render the tree below `root` in display order.
///
/// Passwords are never part of the output.
pub fn format_tree(container: &TreeContainer, root: NodeId, show_paths: bool) -> Vec<String> {
    let Some(node) = container.get(root) else {
        return Vec::new();
    };
    let Some(root_path) = container.path_of(root) else {
        return Vec::new();
    };

    let mut lines = vec![with_path(describe(node), &root_path.to_string(), show_paths)];
    let mut order = SiblingOrder::new();

    // (node, path, prefix for the line, prefix for its children)
    let mut stack: Vec<(NodeId, String, String, String)> = Vec::new();
    push_children(
        container,
        &mut order,
        &mut stack,
        root,
        &root_path.to_string(),
        "",
    );

    while let Some((id, path, prefix, child_prefix)) = stack.pop() {
        let Some(node) = container.get(id) else {
            continue;
        };
        lines.push(with_path(
            format!("{prefix}{}", describe(node)),
            &path,
            show_paths,
        ));
        push_children(container, &mut order, &mut stack, id, &path, &child_prefix);
    }

    lines
}

fn push_children(
    container: &TreeContainer,
    order: &mut SiblingOrder,
    stack: &mut Vec<(NodeId, String, String, String)>,
    parent: NodeId,
    parent_path: &str,
    indent: &str,
) {
    let mut children = container.children(parent).to_vec();
    order.sort(container, &mut children);

    let count = children.len();
    for (i, child) in children.into_iter().enumerate().rev() {
        let is_last = i + 1 == count;
        let (branch, continuation) = if is_last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        stack.push((
            child,
            format!("{parent_path}:{i}"),
            format!("{indent}{branch}"),
            format!("{indent}{continuation}"),
        ));
    }
}

fn with_path(line: String, path: &str, show_paths: bool) -> String {
    if show_paths {
        format!("{line}  {}", format!("[{path}]").dimmed())
    } else {
        line
    }
}

fn describe(node: &Node) -> String {
    match node {
        Node::Root(root) => root.name.bold().to_string(),
        Node::Group(group) => {
            let name = if group.name.is_empty() {
                "(unnamed group)"
            } else {
                group.name.as_str()
            };
            name.blue().bold().to_string()
        }
        Node::Entry(entry) => {
            let title = if entry.title.is_empty() {
                "(untitled)"
            } else {
                entry.title.as_str()
            };
            let mut details = Vec::new();
            if !entry.username.is_empty() {
                details.push(entry.username.clone());
            }
            if !entry.url.is_empty() {
                details.push(entry.url.clone());
            }
            if details.is_empty() {
                title.to_string()
            } else {
                format!("{title}  {}", details.join("  ").dimmed())
            }
        }
    }
}

/// Check file permissions and return warnings.
#[cfg_attr(not(unix), allow(unused_variables, unused_mut))]
pub fn check_file_permissions(path: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    #[cfg(unix)]
    {
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();

            // Check if group or others have any permissions
            if mode & 0o077 != 0 {
                warnings.push(format!(
                    "File has insecure permissions: {:o}. Run 'chmod 600 {}' to fix.",
                    mode & 0o777,
                    path.display()
                ));
            }
        }
    }
    warnings
}

/// Print an error message and exit.
pub fn error_exit(message: &str, code: i32) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), message);
    std::process::exit(code);
}

/// Print a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "Warning:".yellow(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::record::{EntryRecord, GroupRecord, RecordStream};
    use crate::sealed::SealedLibrary;
    use crate::session::SessionManager;

    #[test]
    fn test_parse_node_selector() {
        assert_eq!(
            parse_node_selector("0:2:1"),
            NodeSelector::Path("0:2:1".parse().unwrap())
        );
        assert_eq!(
            parse_node_selector("Internet/Banking/Bank A"),
            NodeSelector::Names(vec![
                "Internet".to_string(),
                "Banking".to_string(),
                "Bank A".to_string()
            ])
        );
        assert_eq!(
            parse_node_selector("/Email/"),
            NodeSelector::Names(vec!["Email".to_string()])
        );
    }

    #[test]
    fn test_format_tree() {
        colored::control::set_override(false);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("db.ptdb");
        let library = SealedLibrary::with_params(KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        });
        library
            .write(
                &path,
                &RecordStream::new(
                    vec![
                        GroupRecord::new(1, 0, "Internet"),
                        GroupRecord::new(2, 1, "Banking"),
                        GroupRecord::new(3, 0, "Email"),
                    ],
                    vec![EntryRecord::new(2, "Bank A")
                        .with_username("alice")
                        .with_password("hunter2")],
                ),
                "pw",
            )
            .unwrap();

        let mut manager = SessionManager::new(library);
        let handle = manager.open(&path, "pw").unwrap();
        let lines = format_tree(manager.container(), handle.root, false);

        assert_eq!(
            lines,
            vec![
                "db.ptdb",
                "├── Email",
                "└── Internet",
                "    └── Banking",
                "        └── Bank A  alice",
            ]
        );
        assert!(lines.iter().all(|line| !line.contains("hunter2")));

        let with_paths = format_tree(manager.container(), handle.root, true);
        assert!(with_paths[4].ends_with("[0:1:0:0]"));
    }
}
