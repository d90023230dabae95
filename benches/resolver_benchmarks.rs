//! Resolver benchmarks
//!
//! Measures the resolution paths that do not depend on a broker:
//! - Cache hits (the steady state)
//! - Contended resolution of one name from many tasks
//! - Configuration extraction for a full connection subtree
//!
//! Run with: cargo bench --bench resolver_benchmarks

use amqp_resolver::{
    ConfigSource, ConnectionConfig, ConnectionResolver, Connector, JsonConfig, ManagedConnection,
    Result,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::time::Duration;

struct NullConnection;

impl ManagedConnection for NullConnection {
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Connector that succeeds after an optional simulated handshake
struct NullConnector {
    latency: Duration,
}

impl Connector for NullConnector {
    type Connection = NullConnection;

    async fn connect(&self, _config: &ConnectionConfig) -> Result<NullConnection> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(NullConnection)
    }
}

fn sample_source() -> JsonConfig {
    JsonConfig::from_value(json!({
        "rabbitmq": {
            "defaultConnection": "primary",
            "connections": {
                "primary": {
                    "host": "mq-primary.internal",
                    "port": 5671,
                    "user": "svc",
                    "password": "secret",
                    "vhost": "/prod",
                    "ssl_protocol": "TLSv1.3",
                    "ssl_options": {
                        "verify_peer": true,
                        "peer_name": "mq.internal",
                        "cafile": "/etc/ssl/mq-ca.pem"
                    },
                    "options": {
                        "connection_timeout": 2.5,
                        "read_write_timeout": 10,
                        "heartbeat": 30,
                        "keepalive": true
                    }
                }
            }
        }
    }))
}

// ============================================================================
// Cache Hit Benchmarks
// ============================================================================

fn cache_hit_benchmarks(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let resolver = ConnectionResolver::new(
        sample_source(),
        NullConnector {
            latency: Duration::ZERO,
        },
    );
    rt.block_on(async {
        resolver.connection("primary").await.unwrap();
    });

    let mut group = c.benchmark_group("cache_hit");

    group.bench_function("named", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(resolver.connection("primary").await.unwrap()) });
    });

    // Includes the default-name lookup
    group.bench_function("default", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(resolver.default_connection().await.unwrap()) });
    });

    group.finish();
}

// ============================================================================
// Contended Resolution Benchmarks
// ============================================================================

fn contended_benchmarks(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("contended_miss");
    group.sample_size(20);

    for tasks in [8usize, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| async move {
                let resolver = ConnectionResolver::new(
                    sample_source(),
                    NullConnector {
                        latency: Duration::from_millis(1),
                    },
                );
                let handles: Vec<_> = (0..tasks)
                    .map(|_| {
                        let resolver = resolver.clone();
                        tokio::spawn(async move { resolver.connection("primary").await })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.await.unwrap().unwrap());
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Configuration Benchmarks
// ============================================================================

fn config_benchmarks(c: &mut Criterion) {
    let source = sample_source();
    let mut group = c.benchmark_group("config");

    group.bench_function("from_value_full", |b| {
        let raw = source.get("rabbitmq.connections.primary").unwrap().unwrap();
        b.iter(|| black_box(ConnectionConfig::from_value(black_box(&raw)).unwrap()));
    });

    group.bench_function("from_value_empty", |b| {
        let raw = json!({});
        b.iter(|| black_box(ConnectionConfig::from_value(black_box(&raw)).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    cache_hit_benchmarks,
    contended_benchmarks,
    config_benchmarks
);
criterion_main!(benches);
