/// Best-effort batch execution
///
/// Every item is submitted concurrently and its outcome recorded on its own.
/// A failing item never fails the batch, and nothing short-circuits.

use futures::future::join_all;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome<K> {
    Ok { key: K },
    Failed { key: K, error: String },
}

impl<K> ItemOutcome<K> {
    pub fn key(&self) -> &K {
        match self {
            ItemOutcome::Ok { key } | ItemOutcome::Failed { key, .. } => key,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ItemOutcome::Ok { .. })
    }
}

/// Per-item results, in submission order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<K> {
    pub outcomes: Vec<ItemOutcome<K>>,
}

impl<K> BatchReport<K> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&K, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Failed { key, error } => Some((key, error.as_str())),
            ItemOutcome::Ok { .. } => None,
        })
    }
}

/// Run all `(key, future)` pairs concurrently and collect one outcome per key
pub async fn run_best_effort<K, I, Fut, E>(items: I) -> BatchReport<K>
where
    I: IntoIterator<Item = (K, Fut)>,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let (keys, futures): (Vec<K>, Vec<Fut>) = items.into_iter().unzip();
    let results = join_all(futures).await;

    let outcomes = keys
        .into_iter()
        .zip(results)
        .map(|(key, result)| match result {
            Ok(()) => ItemOutcome::Ok { key },
            Err(e) => ItemOutcome::Failed {
                key,
                error: e.to_string(),
            },
        })
        .collect();

    BatchReport { outcomes }
}
