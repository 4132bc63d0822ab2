// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod counter;
pub mod events;

/// The kernel is async; commands drive it on a throwaway current-thread runtime.
pub(crate) fn block_on<F: std::future::Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(rt.block_on(fut))
}
