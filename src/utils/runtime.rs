use anyhow::Result;

/// Both binaries run everything on one thread: the tracker is the only writer and most of the
/// time is spent waiting on timers.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
