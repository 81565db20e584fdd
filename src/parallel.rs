//! Bounded-concurrency batch fetching.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cookies::PersistentJar;
use crate::fetch::{fetch_with_jar, FetchError, FetchOptions, FetchResult};

const DEFAULT_MAX_PARALLEL: usize = 5;

/// Fetch every URL concurrently, at most `max_parallel` in flight (zero
/// falls back to 5). Results come back in input order; a failing target
/// records its error in its own slot and never aborts the batch. All tasks
/// share one cookie store, serialized by the store's lock.
pub async fn fetch_parallel(
    urls: &[String],
    options: &FetchOptions,
    max_parallel: usize,
) -> Result<Vec<FetchResult>, FetchError> {
    let limit = if max_parallel == 0 {
        DEFAULT_MAX_PARALLEL
    } else {
        max_parallel
    };

    let jar = if options.no_cookies {
        None
    } else {
        let jar = Arc::new(PersistentJar::new(PersistentJar::default_path()));
        jar.load().map_err(FetchError::CookieLoad)?;
        Some(jar)
    };

    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles = Vec::with_capacity(urls.len());
    for url in urls {
        let mut task_options = options.clone();
        task_options.url = url.clone();
        let task_url = url.clone();
        let semaphore = semaphore.clone();
        let jar = jar.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            match fetch_with_jar(task_options, jar).await {
                Ok(result) => result,
                Err(err) => FetchResult::from_error(task_url, &err),
            }
        }));
    }

    // Awaiting the handles in spawn order keeps results aligned with input.
    let mut results = Vec::with_capacity(handles.len());
    for (handle, url) in handles.into_iter().zip(urls) {
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_err) => {
                let err = FetchError::Execute(crate::executor::ExecuteError::Io(
                    join_err.to_string(),
                ));
                results.push(FetchResult::from_error(url.clone(), &err));
            }
        }
    }
    Ok(results)
}
