use chrono::Utc;
use slog::Drain;
use std::fs::OpenOptions;
use std::io;

/// Root logger writing human-readable records to stdout, tagged with the
/// node's identity.
pub fn create_root_logger_for_stdout(node_id: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("NodeId" => node_id))
}

/// Root logger writing to a timestamped file under `directory_prefix`.
pub fn try_create_root_logger_for_file(directory_prefix: &str, node_id: String) -> io::Result<slog::Logger> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let log_path = format!("{}/{}_{}.log", directory_prefix, node_id, now);
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(log_path)?;

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Ok(slog::Logger::root(drain, slog::o!("NodeId" => node_id)))
}
