//! # CLI Command Implementations

use super::{Backend, StorageArgs};
use crate::api::{self, AppState};
use crate::config::PawlinkConfig;
use crate::error::{AppError, AppResult};
use pawlink_core::{
    Caller, EdgeStore, FollowEdge, GraphError, GraphService, Page, Snapshot, StorageBackend,
    UserId, compute_blake3_hash, export_snapshot, import_snapshot, restore_snapshot,
    snapshot_to_bytes,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum snapshot file size accepted by `import` (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> AppResult<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| AppError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(AppError::Usage(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> AppResult<PathBuf> {
    let canonical = path.canonicalize().map_err(|e| {
        AppError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(AppError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Canonicalize the parent of an output path.
fn validate_output_path(path: &Path) -> AppResult<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        AppError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(AppError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| AppError::Io("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// STORAGE
// =============================================================================

/// Open the graph described by `args`.
///
/// The memory backend starts from the snapshot at `args.database` when one
/// exists.
pub fn open_graph(args: &StorageArgs) -> AppResult<GraphService<StorageBackend>> {
    match args.backend {
        Backend::Redb => Ok(GraphService::new(StorageBackend::redb(
            &args.database,
            args.counts,
        )?)),
        Backend::Memory => {
            let backend = StorageBackend::in_memory(args.counts);
            if args.database.exists() {
                let data = std::fs::read(&args.database)
                    .map_err(|e| AppError::Io(format!("Read snapshot: {}", e)))?;
                let snapshot = import_snapshot(&data)?;
                restore_snapshot(&backend, &snapshot)?;
            }
            Ok(GraphService::new(backend))
        }
    }
}

/// Write the memory backend back to its snapshot file. redb is already durable.
pub fn save_graph(graph: &GraphService<StorageBackend>, args: &StorageArgs) -> AppResult<()> {
    if graph.store().is_persistent() {
        return Ok(());
    }
    let data = export_snapshot(graph.store())?;
    std::fs::write(&args.database, &data)
        .map_err(|e| AppError::Io(format!("Write snapshot: {}", e)))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    args: &StorageArgs,
    config: PawlinkConfig,
    host: &str,
    port: u16,
) -> AppResult<()> {
    let graph = Arc::new(open_graph(args)?);

    println!("pawlink server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", args.backend.name());
    println!("  Counts:   {}", args.counts);
    println!("  Database: {:?}", args.database);
    println!("  Identity: {} header", config.identity_header);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    let state = AppState::new(graph.clone(), config);
    api::run_server(&addr, state).await?;

    save_graph(&graph, args)
}

// =============================================================================
// STATUS / INIT
// =============================================================================

/// Show graph status.
pub fn cmd_status(args: &StorageArgs, json_mode: bool) -> AppResult<()> {
    let graph = open_graph(args)?;
    let edge_count = graph.store().edge_count()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": args.database.to_string_lossy(),
            "backend": args.backend.name(),
            "counts_strategy": args.counts.to_string(),
            "edge_count": edge_count,
        }));
        return Ok(());
    }

    println!("pawlink Graph Status");
    println!("====================");
    println!("Database: {:?}", args.database);
    println!("Backend:  {}", args.backend.name());
    println!("Counts:   {}", args.counts);
    println!();
    println!("Edges:    {}", edge_count);
    Ok(())
}

/// Initialize a new database.
pub fn cmd_init(args: &StorageArgs, force: bool) -> AppResult<()> {
    if args.database.exists() {
        if !force {
            return Err(AppError::Usage(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&args.database)
            .map_err(|e| AppError::Io(format!("Remove existing database: {}", e)))?;
    }

    let graph = open_graph(args)?;
    save_graph(&graph, args)?;
    println!(
        "Initialized new {} database at {:?}",
        args.backend.name(),
        args.database
    );
    Ok(())
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Which edge mutation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationCommand {
    Follow,
    Unfollow,
    Toggle,
}

/// Follow, unfollow or toggle as `caller`.
///
/// Idempotency signals are reported, not treated as failures.
pub fn cmd_mutate(
    args: &StorageArgs,
    json_mode: bool,
    command: MutationCommand,
    caller: u64,
    target: u64,
) -> AppResult<()> {
    let graph = open_graph(args)?;
    let identity = Caller::user(UserId(caller));
    let target_id = UserId(target);

    let result = match command {
        MutationCommand::Follow => graph.follow(&identity, target_id),
        MutationCommand::Unfollow => graph.unfollow(&identity, target_id),
        MutationCommand::Toggle => graph.toggle(&identity, target_id),
    };

    let (changed, following) = match result {
        Ok(mutation) => {
            save_graph(&graph, args)?;
            (true, mutation.is_following())
        }
        Err(GraphError::AlreadyFollowing) => (false, true),
        Err(GraphError::NotFollowing) => (false, false),
        Err(e) => return Err(e.into()),
    };

    if json_mode {
        print_json(&serde_json::json!({
            "caller": caller,
            "target": target,
            "changed": changed,
            "following": following,
        }));
        return Ok(());
    }

    let state = if following { "follows" } else { "does not follow" };
    if changed {
        println!("User {} now {} user {}", caller, state, target);
    } else {
        println!("No change: user {} already {} user {}", caller, state, target);
    }
    Ok(())
}

// =============================================================================
// QUERIES
// =============================================================================

/// Check follow status. Without `--as` the caller is anonymous.
pub fn cmd_is_following(
    args: &StorageArgs,
    json_mode: bool,
    caller: Option<u64>,
    target: u64,
) -> AppResult<()> {
    let graph = open_graph(args)?;
    let identity = caller.map(UserId);
    let following = graph.is_following(&identity, UserId(target))?;

    if json_mode {
        print_json(&serde_json::json!({
            "caller": caller,
            "target": target,
            "following": following,
        }));
    } else {
        match caller {
            Some(c) => println!("{} -> {}: {}", c, target, following),
            None => println!("anonymous -> {}: {}", target, following),
        }
    }
    Ok(())
}

/// Show follower/following totals.
pub fn cmd_counts(args: &StorageArgs, json_mode: bool, user: u64) -> AppResult<()> {
    let graph = open_graph(args)?;
    let counts = graph.follow_counts(UserId(user))?;

    if json_mode {
        print_json(&serde_json::json!({
            "user": user,
            "followers_count": counts.followers_count,
            "following_count": counts.following_count,
        }));
    } else {
        println!("User {}", user);
        println!("  Followers: {}", counts.followers_count);
        println!("  Following: {}", counts.following_count);
    }
    Ok(())
}

/// Which side of the edge set to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDirection {
    Followers,
    Following,
}

/// List followers or followees, newest first.
pub fn cmd_list(
    args: &StorageArgs,
    json_mode: bool,
    direction: ListDirection,
    user: u64,
    offset: usize,
    limit: usize,
) -> AppResult<()> {
    let graph = open_graph(args)?;
    let page = Page::new(offset, limit);
    let edges = match direction {
        ListDirection::Followers => graph.followers(UserId(user), page)?,
        ListDirection::Following => graph.following(UserId(user), page)?,
    };
    let other = |e: &FollowEdge| match direction {
        ListDirection::Followers => e.follower,
        ListDirection::Following => e.following,
    };

    if json_mode {
        let rows: Vec<_> = edges
            .iter()
            .map(|e| serde_json::json!({ "user": other(e).0, "since": e.created_at.0 }))
            .collect();
        print_json(&serde_json::json!({
            "user": user,
            "offset": page.offset,
            "limit": page.limit,
            "users": rows,
        }));
        return Ok(());
    }

    let label = match direction {
        ListDirection::Followers => "Followers",
        ListDirection::Following => "Following",
    };
    println!("{} of user {} (offset {}):", label, user, page.offset);
    if edges.is_empty() {
        println!("  (none)");
    }
    for edge in &edges {
        println!("  {} (since {})", other(edge), edge.created_at.0);
    }
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export the edge set to a snapshot file.
pub fn cmd_export(args: &StorageArgs, json_mode: bool, output: &Path) -> AppResult<()> {
    let validated_output = validate_output_path(output)?;
    let graph = open_graph(args)?;

    let snapshot = Snapshot::from_edges(&graph.store().edges()?);
    let data = snapshot_to_bytes(&snapshot)?;
    let digest = compute_blake3_hash(&data);

    std::fs::write(&validated_output, &data)
        .map_err(|e| AppError::Io(format!("Write file: {}", e)))?;

    if json_mode {
        print_json(&serde_json::json!({
            "output": validated_output.to_string_lossy(),
            "bytes": data.len(),
            "edges": snapshot.edges.len(),
            "checksum": snapshot.checksum(),
            "blake3": digest,
        }));
    } else {
        println!("Checksum: {}", snapshot.checksum());
        println!("BLAKE3:   {}", digest);
        println!(
            "Exported {} edges ({} bytes) to {:?}",
            snapshot.edges.len(),
            data.len(),
            validated_output
        );
    }
    Ok(())
}

/// Restore a snapshot file into an empty database.
pub fn cmd_import(args: &StorageArgs, json_mode: bool, input: &Path) -> AppResult<()> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| AppError::Io(format!("Read file: {}", e)))?;
    let snapshot = import_snapshot(&data)?;

    let graph = open_graph(args)?;
    let written = restore_snapshot(graph.store(), &snapshot)?;
    save_graph(&graph, args)?;

    if json_mode {
        print_json(&serde_json::json!({ "imported_edges": written }));
    } else {
        println!("Imported {} edges into {:?}", written, args.database);
    }
    Ok(())
}

// =============================================================================
// AUDIT
// =============================================================================

/// Check counts against the edge set. Fails on any drift.
pub fn cmd_audit(args: &StorageArgs, json_mode: bool) -> AppResult<()> {
    let graph = open_graph(args)?;
    let report = graph.audit()?;

    if json_mode {
        print_json(&serde_json::json!({
            "consistent": report.is_consistent(),
            "strategy": report.strategy.to_string(),
            "edge_count": report.edge_count,
            "users_checked": report.users_checked,
        }));
    } else {
        println!(
            "Audit clean: {} edges, {} users, counts {}",
            report.edge_count, report.users_checked, report.strategy
        );
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
