//! # Tree Command Implementation
//!
//! This module implements the `tree` subcommand, which displays group
//! membership as a tree. Repositories that belong to no group are the roots;
//! a group's children are its members in resolution order.
//!
//! This command is a safe, read-only operation that does not modify any files.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};

use artifact_repo::config::{Config, RepositoryConfig};

use super::load_config;

/// Display group membership as a tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Maximum depth to display in the tree.
    ///
    /// If not specified, displays the full tree.
    /// Use 0 to show only the top-level repositories.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let tree = build_tree(&config, args.depth.unwrap_or(usize::MAX));
    print_tree(&tree).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
    Ok(())
}

/// A synthetic root whose children are the repositories in no group.
fn build_tree(config: &Config, max_depth: usize) -> TreeNode {
    let grouped: BTreeSet<&str> = config
        .repositories
        .iter()
        .filter_map(|r| match r {
            RepositoryConfig::Group(group) => Some(group.members.iter().map(String::as_str)),
            _ => None,
        })
        .flatten()
        .collect();

    let children = config
        .repositories
        .iter()
        .filter(|r| !grouped.contains(r.id()))
        .map(|r| build_tree_node(config, r.id(), max_depth, 0, &mut Vec::new()))
        .collect();
    TreeNode {
        label: "repositories".to_string(),
        children,
    }
}

fn build_tree_node(
    config: &Config,
    id: &str,
    max_depth: usize,
    current_depth: usize,
    path: &mut Vec<String>,
) -> TreeNode {
    let Some(repository) = config.repository(id) else {
        return TreeNode {
            label: format!("{} (missing)", id),
            children: vec![],
        };
    };
    let label = format!("{} ({})", id, repository.kind());

    let members: &[String] = match repository {
        RepositoryConfig::Group(group) => group.members.as_slice(),
        _ => &[],
    };
    if current_depth >= max_depth || members.is_empty() || path.iter().any(|p| p == id) {
        return TreeNode {
            label,
            children: vec![],
        };
    }

    path.push(id.to_string());
    let children = members
        .iter()
        .map(|member| build_tree_node(config, member, max_depth, current_depth + 1, path))
        .collect();
    path.pop();
    TreeNode { label, children }
}

/// Tree node structure for ptree visualization
#[derive(Clone, Debug)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}
