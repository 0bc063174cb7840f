/**
 * Pattern Search Performance Benchmarks
 *
 * DESIGN DECISION: Benchmark suite covering realistic library sizes and a
 * batch-query workload
 * WHY: Validate search stays responsive as the local pattern library grows
 * from an individual's handful of patterns to an enterprise-scale shared
 * collection
 *
 * REASONING CHAIN:
 * 1. Patterns vary in name, description length, tag count, and language
 * 2. Mix of languages and pattern types approximates a real library
 * 3. Hybrid mode is benchmarked since it's the default and does the most
 *    work (lexical + MinHash-estimated semantic scoring per candidate)
 * 4. Batch queries validate roughly linear scaling with library size
 *
 * # Running Benchmarks
 *
 * ```bash
 * cargo bench
 * cargo bench -- small_library
 * cargo bench --bench pattern_matching
 * # Open: target/criterion/report/index.html
 * ```
 */

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use remembrance_oracle::pattern::{Complexity, GenerationMethod, Language, Pattern, PatternType};
use remembrance_oracle::store::PatternStore;
use remembrance_oracle::{SearchEngine, SearchMode, SearchOptions};

fn generate_test_patterns(count: usize) -> Vec<Pattern> {
    let languages = [
        Language::Rust,
        Language::Python,
        Language::Javascript,
        Language::Go,
        Language::Typescript,
    ];

    let topics = [
        ("error_handling", "Best practices for handling errors and exceptions"),
        ("authenticate", "Secure authentication and authorization patterns"),
        ("query_database", "Efficient database query and connection patterns"),
        ("design_api", "RESTful and GraphQL API design patterns"),
        ("run_tests", "Unit testing and integration testing strategies"),
        ("optimize", "Optimization techniques for high performance"),
        ("parallelize", "Parallel processing and async programming patterns"),
        ("sanitize_input", "Common security vulnerabilities and mitigations"),
        ("log_event", "Structured logging and observability patterns"),
        ("load_config", "Configuration management and environment handling"),
    ];

    (0..count)
        .map(|i| {
            let (topic_name, topic_desc) = topics[i % topics.len()];
            let language = languages[i % languages.len()];

            Pattern::builder()
                .name(format!("{topic_name}_{i}"))
                .code(format!(
                    "function {topic_name}_{i}() {{ /* {topic_desc} */ return true; }}"
                ))
                .language(language)
                .description(format!(
                    "{topic_desc}. Validated in production, covers common edge cases."
                ))
                .tags(vec![topic_name.to_string(), format!("lang-{i}")])
                .pattern_type(PatternType::Utility)
                .complexity(Complexity::Medium)
                .generation_method(GenerationMethod::Seed)
                .build()
                .unwrap()
        })
        .collect()
}

fn seed_store(count: usize) -> PatternStore {
    let store = PatternStore::open_in_memory().unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    for pattern in generate_test_patterns(count) {
        runtime.block_on(store.insert(pattern, false)).unwrap();
    }
    store
}

fn bench_library_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("hybrid_search_by_library_size");
    for &size in &[100usize, 1_000, 10_000] {
        let store = seed_store(size);
        let engine = SearchEngine::new(&store);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_batched(
                || SearchOptions {
                    mode: SearchMode::Hybrid,
                    ..Default::default()
                },
                |opts| engine.search("optimize performance", &opts),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_batch_queries(c: &mut Criterion) {
    let store = seed_store(1_000);
    let engine = SearchEngine::new(&store);
    let queries = [
        "error handling",
        "authenticate user",
        "query database",
        "design api",
        "run tests",
        "optimize performance",
        "parallelize work",
        "sanitize input",
        "log event",
        "load config",
    ];

    c.bench_function("batch_queries_1000_patterns", |b| {
        b.iter(|| {
            for term in &queries {
                let _ = engine.search(
                    term,
                    &SearchOptions {
                        mode: SearchMode::Hybrid,
                        ..Default::default()
                    },
                );
            }
        });
    });
}

fn bench_smart_search(c: &mut Criterion) {
    let store = seed_store(1_000);
    let engine = SearchEngine::new(&store);
    c.bench_function("smart_search_1000_patterns", |b| {
        b.iter(|| engine.smart_search("optimize performance", &SearchOptions::default()));
    });
}

criterion_group!(benches, bench_library_sizes, bench_batch_queries, bench_smart_search);
criterion_main!(benches);
