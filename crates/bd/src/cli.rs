//! Clap CLI definitions for the `bd` command.

use clap::{Args, Parser, Subcommand};

/// bd -- dependency-aware issue tracker for humans and agents.
#[derive(Parser, Debug)]
#[command(
    name = "bd",
    about = "Dependency-aware issue tracker",
    long_about = "Issues chained together like beads. Designed for many agents \
                  mutating the same tracker through ordinary git workflows.",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Workspace metadata directory (default: auto-discover .beads/).
    #[arg(long, global = true, env = "BEADS_DIR")]
    pub db: Option<String>,

    /// Actor name for the audit trail (default: $BEADS_ACTOR, git
    /// user.name, $USER).
    #[arg(long, global = true, env = "BEADS_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Read-only mode: block write operations.
    #[arg(long, global = true)]
    pub readonly: bool,

    /// JSONL-only mode: operate without the database file.
    #[arg(long = "no-db", global = true)]
    pub no_db: bool,

    /// Sandbox mode: no daemon, no flush side effects outside the target.
    #[arg(long, global = true)]
    pub sandbox: bool,

    /// Enable verbose/debug output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a .beads workspace in the current directory.
    Init(InitArgs),

    /// Create a new issue.
    #[command(alias = "new")]
    Create(CreateArgs),

    /// Update issue fields.
    Update(UpdateArgs),

    /// Show issue details.
    #[command(alias = "view")]
    Show(ShowArgs),

    /// List issues.
    List(ListArgs),

    /// Show ready work (open, no open blockers), sorted by priority.
    Ready(ReadyArgs),

    /// Show blocked issues with their open blockers.
    Blocked,

    /// Close one or more issues.
    Close(CloseArgs),

    /// Reopen a closed issue.
    Reopen(ReopenArgs),

    /// Delete (tombstone) issues.
    Delete(DeleteArgs),

    /// Rename an issue id, rewriting every reference.
    Rename(RenameArgs),

    /// Move an issue into another workspace.
    Refile(RefileArgs),

    /// Manage dependencies between issues.
    Dep(DepArgs),

    /// Manage labels on an issue.
    Label(LabelArgs),

    /// Add a comment to an issue.
    Comment(CommentArgs),

    /// List comments on an issue.
    Comments(CommentsArgs),

    /// Export the canonical JSONL projection.
    Export(ExportArgs),

    /// Import a JSONL file into the store.
    Import(ImportArgs),

    /// Show workspace statistics.
    Stats,

    /// Show or manage configured issue types.
    Types(TypesArgs),

    /// Administrative maintenance commands.
    Admin(AdminArgs),

    /// Control the per-workspace daemon.
    Daemon(DaemonArgs),

    /// Three-way merge driver for issues.jsonl (invoked by git).
    Merge(MergeArgs),

    /// Generate shell completions.
    Completion(CompletionArgs),
}

// ---------------------------------------------------------------------------
// Per-command argument structs
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Issue id prefix for this workspace.
    #[arg(long, default_value = "bd")]
    pub prefix: String,

    /// Reinitialize even if a workspace already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Issue title.
    pub title: String,

    /// Issue type (task, bug, feature, chore, epic, or a configured type).
    #[arg(short = 't', long = "type", default_value = "task")]
    pub issue_type: String,

    /// Priority 0-4 (also accepts P0-P4).
    #[arg(short = 'p', long, default_value = "2")]
    pub priority: String,

    /// Description body.
    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// Assignee.
    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    /// Labels (repeatable, comma lists accepted).
    #[arg(short = 'l', long = "label")]
    pub labels: Vec<String>,

    /// Parent issue: creates a child id and a parent-child dependency.
    #[arg(long)]
    pub parent: Option<String>,

    /// Blocking dependencies (ids this issue depends on).
    #[arg(long = "dep")]
    pub deps: Vec<String>,

    /// Explicit issue id (default: generated).
    #[arg(long)]
    pub id: Option<String>,

    /// Transient issue, excluded from the JSONL projection.
    #[arg(long)]
    pub ephemeral: bool,

    /// Pin the issue (excluded from cleanup sweeps).
    #[arg(long)]
    pub pinned: bool,

    /// Print only the new id.
    #[arg(long)]
    pub silent: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Issue id (partial ids resolve when unambiguous).
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long)]
    pub design: Option<String>,

    #[arg(long)]
    pub acceptance_criteria: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,

    /// New status (open, in_progress, blocked, closed).
    #[arg(short = 's', long)]
    pub status: Option<String>,

    /// New priority 0-4.
    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    #[arg(long)]
    pub estimate: Option<i32>,

    /// Arbitrary field=value pairs; immutable fields are rejected.
    #[arg(long = "set")]
    pub set: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Issue id (partial ids resolve when unambiguous).
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status.
    #[arg(short = 's', long)]
    pub status: Option<String>,

    /// Filter by priority.
    #[arg(short = 'p', long)]
    pub priority: Option<i32>,

    /// Filter by type.
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Filter by assignee.
    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    /// Require ALL of these labels.
    #[arg(short = 'l', long = "label")]
    pub labels: Vec<String>,

    /// Free-text search over title/description/notes.
    #[arg(long)]
    pub search: Option<String>,

    /// Include tombstoned issues.
    #[arg(long)]
    pub include_tombstones: bool,

    /// Maximum issues to print.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ReadyArgs {
    /// Filter by assignee.
    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    /// Filter by type.
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Include issues deferred into the future.
    #[arg(long)]
    pub include_deferred: bool,

    /// Maximum issues to print.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Issue ids to close.
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Close reason.
    #[arg(short = 'r', long, default_value = "")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct ReopenArgs {
    /// Issue id to reopen.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Issue ids to delete.
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Deletion reason, recorded in the manifest.
    #[arg(short = 'r', long, default_value = "")]
    pub reason: String,

    /// Also delete parent-child children.
    #[arg(long)]
    pub cascade: bool,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Current issue id.
    pub old_id: String,
    /// New issue id.
    pub new_id: String,
}

#[derive(Args, Debug)]
pub struct RefileArgs {
    /// Issue id to move.
    pub id: String,

    /// Target workspace metadata directory (its .beads path).
    #[arg(long = "to")]
    pub to: String,
}

#[derive(Args, Debug)]
pub struct DepArgs {
    #[command(subcommand)]
    pub command: DepCommands,
}

#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Add a dependency: ISSUE depends on TARGET.
    Add {
        issue: String,
        target: String,
        /// Edge type: blocks, parent-child, related, duplicates,
        /// discovered-from.
        #[arg(short = 't', long = "type", default_value = "blocks")]
        dep_type: String,
    },
    /// Remove the dependency between ISSUE and TARGET.
    Remove { issue: String, target: String },
    /// List the issues ISSUE depends on.
    List { issue: String },
}

#[derive(Args, Debug)]
pub struct LabelArgs {
    #[command(subcommand)]
    pub command: LabelCommands,
}

#[derive(Subcommand, Debug)]
pub enum LabelCommands {
    /// Add a label to an issue.
    Add { issue: String, label: String },
    /// Remove a label from an issue.
    Remove { issue: String, label: String },
    /// List labels on an issue.
    List { issue: String },
}

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Issue id.
    pub id: String,
    /// Comment text.
    pub text: String,
}

#[derive(Args, Debug)]
pub struct CommentsArgs {
    /// Issue id.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output path (default: the canonical issues.jsonl; "-" for stdout).
    #[arg(short = 'o', long)]
    pub output: Option<String>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Input JSONL path (default: the canonical issues.jsonl).
    pub input: Option<String>,
}

#[derive(Args, Debug)]
pub struct TypesArgs {
    #[command(subcommand)]
    pub command: Option<TypesCommands>,
}

#[derive(Subcommand, Debug)]
pub enum TypesCommands {
    /// List builtin and configured custom types.
    List,
    /// Add a custom type to the workspace config.
    Add { name: String },
}

#[derive(Args, Debug)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommands,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Prune expired tombstones and manifest entries.
    Cleanup {
        /// Override the retention TTL in days.
        #[arg(long = "older-than")]
        older_than: Option<u64>,
        /// Apply the TTL override even when it allows resurrection
        /// (TTL 0 prunes everything).
        #[arg(long)]
        hard: bool,
    },
    /// Rewrite the deletion manifest union-by-key.
    Compact,
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommands,
}

#[derive(Subcommand, Debug)]
pub enum DaemonCommands {
    /// Run the daemon in the foreground (typically under a supervisor).
    Start,
    /// Stop the running daemon.
    Stop,
    /// Report daemon liveness.
    Status,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Common ancestor version.
    pub base: String,
    /// Local version (written in place unless --output is given).
    pub local: String,
    /// Remote version.
    pub remote: String,

    /// Write the merged file here instead of over LOCAL.
    #[arg(short = 'o', long)]
    pub output: Option<String>,
}

#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn create_parses_labels_and_parent() {
        let cli = Cli::parse_from([
            "bd", "create", "Fix it", "-l", "a,b", "--parent", "bd-1", "-p", "P1",
        ]);
        match cli.command {
            Some(Commands::Create(args)) => {
                assert_eq!(args.title, "Fix it");
                assert_eq!(args.labels, vec!["a,b"]);
                assert_eq!(args.parent.as_deref(), Some("bd-1"));
                assert_eq!(args.priority, "P1");
            }
            other => panic!("wrong parse: {other:?}"),
        }
    }

    #[test]
    fn global_flags_reach_subcommands() {
        let cli = Cli::parse_from(["bd", "--json", "--readonly", "list"]);
        assert!(cli.global.json);
        assert!(cli.global.readonly);
    }
}
