//! CLI command implementations.

use colored::Colorize;
use fmemo_core::{parse_file, DirectoryTree, ExtensionFilter, MemoNode};
use fmemo_server::{MemoServer, ServerConfig, CONFIG_DIR, CONFIG_FILE};
use fmemo_watcher::TreeBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Initialize fmemo in a directory.
pub fn init(path: &Path) -> Result<()> {
    let config_path = ServerConfig::default_path(path);

    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    ServerConfig::default().save(&config_path)?;

    println!("{} Initialized fmemo in {}", "✓".green(), path.display());
    println!(
        "  Settings live in {}",
        Path::new(CONFIG_DIR).join(CONFIG_FILE).display()
    );
    println!("  Run {} to start serving", "fmemo serve".cyan());

    Ok(())
}

/// Command-line settings that win over the config file.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub config: Option<PathBuf>,
    pub http_port: Option<u16>,
    pub debounce_ms: Option<u64>,
}

/// Resolves the effective server config for a root.
fn load_config(path: &Path, overrides: &ServeOverrides) -> Result<ServerConfig> {
    let mut config = match &overrides.config {
        Some(file) => {
            debug!("Loading config from {}", file.display());
            let mut config = ServerConfig::load(file)?;
            config.root = path.to_path_buf();
            config
        }
        None => ServerConfig::discover(path)?,
    };

    if let Some(port) = overrides.http_port {
        config.http_addr.set_port(port);
    }
    if let Some(ms) = overrides.debounce_ms {
        config.debounce_ms = ms;
    }
    Ok(config)
}

/// Start the fmemo server.
pub async fn serve(path: &Path, overrides: ServeOverrides) -> Result<()> {
    println!("{}", "Starting fmemo server...".cyan());

    let config = load_config(path, &overrides)?;
    let tree = TreeBuilder::new(config.tree_options()).build(path)?;

    println!(
        "{} Found {} memo files under {}",
        "✓".green(),
        tree.file_count().to_string().cyan(),
        path.display()
    );
    println!("{} HTTP API on http://{}", "✓".green(), config.http_addr);
    println!("{} Push updates on ws://{}/ws", "✓".green(), config.http_addr);
    println!("  Press {} to stop", "Ctrl+C".cyan());

    MemoServer::new(config).run().await?;

    Ok(())
}

/// Parse one file and print its outline.
pub fn parse(file: &Path, json: bool) -> Result<()> {
    let document = parse_file(file, &ExtensionFilter::default())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&document.memos)?);
    } else {
        if document.memos.is_empty() {
            println!("{}", "(empty document)".dimmed());
        }
        for line in outline_lines(&document.memos) {
            println!("{}", line);
        }
    }

    for warning in &document.warnings {
        eprintln!("{} {}", "⚠".yellow(), warning);
    }

    Ok(())
}

/// Print the directory tree of memo files.
pub fn tree(path: &Path, json: bool) -> Result<()> {
    let tree = build_tree(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }

    println!("{}", path.display().to_string().cyan().bold());
    for line in tree_lines(&tree) {
        println!("{}", line);
    }
    println!();
    println!("  {} {}", "Memo files:".dimmed(), tree.file_count());

    Ok(())
}

/// Walks `path` with the filters from its config file, if any.
fn build_tree(path: &Path) -> Result<DirectoryTree> {
    let config = ServerConfig::discover(path)?;
    Ok(TreeBuilder::new(config.tree_options()).build(path)?)
}

/// One line per memo node, indented by depth.
fn outline_lines(memos: &[MemoNode]) -> Vec<String> {
    fn walk(node: &MemoNode, depth: usize, out: &mut Vec<String>) {
        let marker = if node.is_prologue() {
            "(prologue)".to_string()
        } else {
            format!("{} {}", "#".repeat(node.level as usize), node.title)
        };
        let mut line = format!("{}{}", "  ".repeat(depth), marker);
        if let Some(desc) = &node.description {
            line.push_str(&format!(": {}", desc));
        }
        if let Some(path) = &node.path {
            line.push_str(&format!(" -> {}", path));
        }
        if !node.code_blocks.is_empty() {
            line.push_str(&format!(" [{} code]", node.code_blocks.len()));
        }
        out.push(line);
        for child in &node.children {
            walk(child, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    for node in memos {
        walk(node, 0, &mut out);
    }
    out
}

/// Directories end in `/`; files are listed under their directory.
fn tree_lines(tree: &DirectoryTree) -> Vec<String> {
    fn walk(dir: &DirectoryTree, depth: usize, out: &mut Vec<String>) {
        for sub in &dir.subdirectories {
            out.push(format!("{}{}/", "  ".repeat(depth), sub.name()));
            walk(sub, depth + 1, out);
        }
        for file in &dir.files {
            out.push(format!("{}{}", "  ".repeat(depth), file));
        }
    }

    let mut out = Vec::new();
    walk(tree, 1, &mut out);
    out
}
