//! End-to-end scenarios for the request-tracing middleware.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use reqtrace::middleware::{
    HandlerResult, RequestEnv, RequestTracingMiddleware, Response,
};
use reqtrace::trace::{InMemorySpanExporter, Span, SpanKind, StatusCode, Value};
use reqtrace::SpanId;

const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

#[test]
fn hello_world_without_tracing_header() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |_env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
            Ok(Response::new(200).with_body(vec![b"Hello world!".to_vec()]))
        },
    )
    .with_exporter(exporter.clone())
    .build();

    let mut env = RequestEnv::get("/");
    let response = middleware.call(&mut env).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, vec![b"Hello world!".to_vec()]);

    let trees = exporter.get_finished_trees().unwrap();
    assert_eq!(trees.len(), 1);
    let root = trees[0].root().unwrap();
    assert_eq!(root.name, "/");
    assert_eq!(root.kind, SpanKind::Server);
    assert_eq!(root.parent_span_id, None);
    assert_eq!(
        root.attributes.get("http.method"),
        Some(&Value::String("GET".to_owned()))
    );
    assert_eq!(
        root.attributes.get("http.path"),
        Some(&Value::String("/".to_owned()))
    );
    assert_eq!(root.status.as_ref().unwrap().code, StatusCode::Ok);
}

#[test]
fn lengthy_request_continues_trace_and_nests_sub_span() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |_env: &mut RequestEnv, span: &mut Span| -> HandlerResult {
            span.in_span("long task", |long_task| {
                long_task.put_attribute("work", true);
            });
            Ok(Response::new(200))
        },
    )
    .with_exporter(exporter.clone())
    .build();

    let mut env = RequestEnv::get("/lengthy").with_header("traceparent", TRACEPARENT);
    middleware.call(&mut env).unwrap();

    let trees = exporter.get_finished_trees().unwrap();
    assert_eq!(trees.len(), 1);
    let tree = &trees[0];
    assert_eq!(
        tree.trace_id().to_string(),
        "4bf92f3577b34da6a3ce929d0e0e4736"
    );
    assert!(tree.trace_options().is_sampled());

    let root = tree.root().unwrap();
    assert_eq!(root.name, "/lengthy");
    assert_eq!(
        root.parent_span_id,
        Some(SpanId::from_hex("00f067aa0ba902b7").unwrap())
    );
    assert!(!root.same_process_as_parent);

    let child = tree
        .spans()
        .iter()
        .find(|span| span.name == "long task")
        .unwrap();
    assert_eq!(child.parent_span_id, Some(root.span_id));
    assert!(child.same_process_as_parent);
    assert!(child.end_time <= root.end_time);
}

#[test]
fn not_found_response_maps_status() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |_env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
            Ok(Response::new(404))
        },
    )
    .with_exporter(exporter.clone())
    .build();

    middleware.call(&mut RequestEnv::get("/missing")).unwrap();

    let trees = exporter.get_finished_trees().unwrap();
    let status = trees[0].root().unwrap().status.clone().unwrap();
    assert_eq!(status.code, StatusCode::NotFound);
}

#[test]
fn failing_handler_still_exports_exactly_once() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |_env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
            Err("database unreachable".into())
        },
    )
    .with_exporter(exporter.clone())
    .build();

    let err = middleware.call(&mut RequestEnv::get("/")).unwrap_err();
    assert_eq!(err.to_string(), "database unreachable");

    let trees = exporter.get_finished_trees().unwrap();
    assert_eq!(trees.len(), 1);
    let root = trees[0].root().unwrap();
    assert_eq!(root.name, "/");
    assert!(root.status.is_none());
}

#[test]
fn panicking_handler_still_exports_exactly_once() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |_env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
            panic!("handler exploded");
        },
    )
    .with_exporter(exporter.clone())
    .build();

    let mut env = RequestEnv::get("/");
    let result = catch_unwind(AssertUnwindSafe(|| middleware.call(&mut env)));
    assert!(result.is_err());

    let trees = exporter.get_finished_trees().unwrap();
    assert_eq!(trees.len(), 1);
    assert!(trees[0].root().unwrap().status.is_none());
}

#[test]
fn callbacks_run_in_order_and_reach_the_exporter() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
            env.extensions
                .insert("long_task_duration".to_owned(), "0.25".to_owned());
            Ok(Response::new(200))
        },
    )
    .with_exporter(exporter.clone())
    .with_on_start_span(|span, env| {
        let user_id = env.headers.get("x-user-id").cloned().unwrap_or_default();
        span.put_attribute("user_id", user_id);
        // Runs before the handler: nothing stored yet.
        assert!(env.extensions.is_empty());
        assert!(span.status().is_none());
    })
    .with_on_finish_span(|span, env| {
        let duration = env
            .extensions
            .get("long_task_duration")
            .cloned()
            .unwrap_or_default();
        span.put_attribute("long_task_duration", duration);
        // Runs after status assignment.
        assert_eq!(span.status().unwrap().code, StatusCode::Ok);
    })
    .build();

    let mut env = RequestEnv::get("/").with_header("X-User-Id", "alice");
    middleware.call(&mut env).unwrap();

    let trees = exporter.get_finished_trees().unwrap();
    let root = trees[0].root().unwrap();
    assert_eq!(
        root.attributes.get("user_id"),
        Some(&Value::String("alice".to_owned()))
    );
    assert_eq!(
        root.attributes.get("long_task_duration"),
        Some(&Value::String("0.25".to_owned()))
    );
}

#[test]
fn request_metadata_attributes() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |_env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
            Ok(Response::new(200))
        },
    )
    .with_exporter(exporter.clone())
    .build();

    let mut env = RequestEnv::get("/search")
        .with_header("Host", "example.com")
        .with_header("User-Agent", "curl/8.0")
        .with_query_string("q=spans");
    middleware.call(&mut env).unwrap();

    let trees = exporter.get_finished_trees().unwrap();
    let attributes = &trees[0].root().unwrap().attributes;
    assert_eq!(
        attributes.get("http.host"),
        Some(&Value::String("example.com".to_owned()))
    );
    assert_eq!(
        attributes.get("http.url"),
        Some(&Value::String("http://example.com/search?q=spans".to_owned()))
    );
    assert_eq!(
        attributes.get("http.client_protocol"),
        Some(&Value::String("HTTP/1.1".to_owned()))
    );
    assert_eq!(
        attributes.get("http.user_agent"),
        Some(&Value::String("curl/8.0".to_owned()))
    );
    assert!(matches!(attributes.get("pid"), Some(Value::I64(_))));
    assert!(matches!(attributes.get("tid"), Some(Value::String(_))));
}

#[test]
fn malformed_header_starts_new_root() {
    let exporter = InMemorySpanExporter::default();
    let middleware = RequestTracingMiddleware::builder(
        |_env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
            Ok(Response::new(200))
        },
    )
    .with_exporter(exporter.clone())
    .build();

    let mut env = RequestEnv::get("/").with_header("traceparent", "garbage");
    middleware.call(&mut env).unwrap();

    let trees = exporter.get_finished_trees().unwrap();
    assert_eq!(trees[0].root().unwrap().parent_span_id, None);
    assert_ne!(
        trees[0].trace_id().to_string(),
        "4bf92f3577b34da6a3ce929d0e0e4736"
    );
}

#[test]
fn concurrent_requests_get_independent_trees() {
    let exporter = InMemorySpanExporter::default();
    let middleware = Arc::new(
        RequestTracingMiddleware::builder(
            |env: &mut RequestEnv, span: &mut Span| -> HandlerResult {
                span.in_span("work", |_| {});
                Ok(Response::new(200).with_body(vec![env.path_info.clone().into_bytes()]))
            },
        )
        .with_exporter(exporter.clone())
        .build(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let middleware = Arc::clone(&middleware);
            thread::spawn(move || {
                let mut env = RequestEnv::get(format!("/job/{i}"));
                middleware.call(&mut env).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let trees = exporter.get_finished_trees().unwrap();
    assert_eq!(trees.len(), 8);
    for tree in &trees {
        assert_eq!(tree.spans().len(), 2);
        assert!(tree.root().unwrap().name.starts_with("/job/"));
    }
    let mut trace_ids: Vec<_> = trees.iter().map(|t| t.trace_id()).collect();
    trace_ids.sort_by_key(|id| id.to_bytes());
    trace_ids.dedup();
    assert_eq!(trace_ids.len(), 8);
}
