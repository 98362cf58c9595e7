//! Lazy resource enumeration over paginated list operations.

use std::collections::HashSet;

use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::{CollectorError, ProviderError};
use crate::provider::{Provider, Request};

/// What to list: `service.operation`, reading records from `resource_list_field`.
#[derive(Debug, Clone, Copy)]
pub struct Collector<'a> {
    pub service: &'a str,
    pub operation: &'a str,
    pub resource_list_field: &'a str,
}

/// Stream every record the collector lists, one page at a time.
///
/// The next page is requested only once the records of the current page
/// have been consumed. The first error ends the stream, including a token
/// that was already sent, so a cycling provider cannot page forever.
pub fn walk<'a>(
    provider: &'a dyn Provider,
    collector: Collector<'a>,
) -> BoxStream<'a, Result<Value, CollectorError>> {
    Box::pin(async_stream::try_stream! {
        let pagination = provider.pagination(collector.service, collector.operation);
        let mut request = Request::new();
        let mut sent_tokens: HashSet<String> = HashSet::new();
        let mut page_number = 0usize;

        loop {
            let page = provider
                .invoke(collector.service, collector.operation, request.clone())
                .await
                .map_err(|source| CollectorError::Provider {
                    service: collector.service.to_string(),
                    operation: collector.operation.to_string(),
                    source,
                })?;
            page_number += 1;

            let records = page_records(&collector, &page)?;
            tracing::debug!(
                service = collector.service,
                operation = collector.operation,
                page = page_number,
                records = records.len(),
                "Fetched resource page"
            );
            for record in records {
                yield record;
            }

            let Some(pagination) = &pagination else { break };
            let next = match page.get(&pagination.output_token) {
                Some(Value::String(token)) if !token.is_empty() => token.clone(),
                _ => break,
            };
            if !sent_tokens.insert(next.clone()) {
                Err::<(), _>(CollectorError::PaginationLoop {
                    service: collector.service.to_string(),
                    operation: collector.operation.to_string(),
                    token: next.clone(),
                })?;
            }
            request.insert(pagination.input_token.clone(), Value::String(next));
        }
    })
}

fn page_records(collector: &Collector<'_>, page: &Value) -> Result<Vec<Value>, CollectorError> {
    if !page.is_object() {
        return Err(CollectorError::Provider {
            service: collector.service.to_string(),
            operation: collector.operation.to_string(),
            source: ProviderError::MalformedResponse(format!(
                "expected a page object, got {}",
                page
            )),
        });
    }

    match page.get(collector.resource_list_field) {
        Some(Value::Array(records)) => Ok(records.clone()),
        _ => Err(CollectorError::MissingResourceList {
            service: collector.service.to_string(),
            operation: collector.operation.to_string(),
            field: collector.resource_list_field.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{OperationRegistry, Pagination};
    use futures::TryStreamExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COLLECTOR: Collector<'static> = Collector {
        service: "s3",
        operation: "listBuckets",
        resource_list_field: "Buckets",
    };

    fn paged_registry(pages: Vec<Value>, calls: Arc<AtomicUsize>) -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        registry.register_paginated(
            "s3",
            "listBuckets",
            Pagination::new("ContinuationToken", "ContinuationToken"),
            move |request: Request| {
                let pages = pages.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let index = match request.get("ContinuationToken") {
                        Some(Value::String(token)) => token.parse::<usize>().unwrap(),
                        _ => 0,
                    };
                    Ok::<_, ProviderError>(pages[index].clone())
                }
            },
        );
        registry
    }

    fn page(names: &[&str], next: Option<usize>) -> Value {
        let buckets: Vec<Value> = names.iter().map(|n| json!({ "Name": n })).collect();
        match next {
            Some(next) => json!({ "Buckets": buckets, "ContinuationToken": next.to_string() }),
            None => json!({ "Buckets": buckets }),
        }
    }

    #[tokio::test]
    async fn test_walk_follows_tokens() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = paged_registry(
            vec![page(&["a", "b"], Some(1)), page(&[], Some(2)), page(&["c"], None)],
            calls.clone(),
        );

        let records: Vec<Value> = walk(&registry, COLLECTOR).try_collect().await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r["Name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_walk_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = paged_registry(
            vec![page(&["a"], Some(1)), page(&["b"], None)],
            calls.clone(),
        );

        let mut stream = walk(&registry, COLLECTOR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first["Name"], json!("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unpaginated_operation_is_single_page() {
        let mut registry = OperationRegistry::new();
        registry.register("s3", "listBuckets", |_: Request| async {
            Ok::<_, ProviderError>(json!({ "Buckets": [{"Name": "a"}], "ContinuationToken": "ignored" }))
        });

        let records: Vec<Value> = walk(&registry, COLLECTOR).try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_resource_list_is_an_error() {
        let mut registry = OperationRegistry::new();
        registry.register("s3", "listBuckets", |_: Request| async {
            Ok::<_, ProviderError>(json!({ "Owner": {} }))
        });

        let result: Result<Vec<Value>, _> = walk(&registry, COLLECTOR).try_collect().await;
        assert!(matches!(
            result,
            Err(CollectorError::MissingResourceList { .. })
        ));
    }

    #[tokio::test]
    async fn test_repeated_token_is_an_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = paged_registry(
            vec![page(&["a"], Some(1)), page(&["b"], Some(1))],
            calls,
        );

        let result: Result<Vec<Value>, _> = walk(&registry, COLLECTOR).try_collect().await;
        assert!(matches!(result, Err(CollectorError::PaginationLoop { .. })));
    }

    #[tokio::test]
    async fn test_token_cycle_is_an_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = paged_registry(
            vec![
                page(&["a"], Some(1)),
                page(&["b"], Some(2)),
                page(&["c"], Some(1)),
            ],
            calls.clone(),
        );

        let result: Result<Vec<Value>, _> = walk(&registry, COLLECTOR).try_collect().await;
        match result {
            Err(CollectorError::PaginationLoop { token, .. }) => assert_eq!(token, "1"),
            other => panic!("expected a pagination loop, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_object_page_is_malformed() {
        let mut registry = OperationRegistry::new();
        registry.register("s3", "listBuckets", |_: Request| async {
            Ok::<_, ProviderError>(json!([{ "Name": "a" }]))
        });

        let result: Result<Vec<Value>, _> = walk(&registry, COLLECTOR).try_collect().await;
        assert!(matches!(
            result,
            Err(CollectorError::Provider {
                source: ProviderError::MalformedResponse(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_ends_stream() {
        let registry = OperationRegistry::new();
        let result: Result<Vec<Value>, _> = walk(&registry, COLLECTOR).try_collect().await;
        assert!(matches!(result, Err(CollectorError::Provider { .. })));
    }
}
