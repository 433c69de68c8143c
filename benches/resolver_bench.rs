use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use relation_dispatcher::{
    Boolean, Catalog, CatalogConfig, Connection, ConnectionDescriptor, CountRelation, Operator, SqlCompiler,
    StaticConnection,
};
use std::hint::black_box;
use std::sync::Arc;

// 创建演示目录，远程查询返回固定的主键
fn create_catalog() -> Catalog {
    Catalog::from_config(CatalogConfig::demo(), |name: &str, descriptor: &ConnectionDescriptor| {
        Arc::new(StaticConnection::new(name, descriptor.clone()).with_rows(1i64..=50)) as Arc<dyn Connection>
    })
    .expect("演示配置应该有效")
}

// 基准测试：关系分派（计划构建，不编译）
fn benchmark_dispatch(c: &mut Criterion) {
    let catalog = create_catalog();
    let test_cases = vec![
        ("embedded", "User", "posts"),
        ("marker", "Post", "comments"),
        ("decomposed", "User", "team"),
        ("self_relation", "User", "manager"),
        ("nested", "User", "posts.comments"),
    ];

    let mut group = c.benchmark_group("dispatch_performance");

    for (name, entity, relation) in test_cases {
        group.bench_with_input(BenchmarkId::new("has", name), &(entity, relation), |b, &(entity, relation)| {
            b.iter(|| {
                let mut query = catalog.query(entity).expect("实体应该存在");
                query
                    .has(black_box(relation), Operator::Gte, 1, Boolean::And, None)
                    .expect("分派应该成功");
                black_box(query.into_plan())
            })
        });
    }

    group.finish();
}

// 基准测试：SQL编译性能
fn benchmark_sql_compiler(c: &mut Criterion) {
    let catalog = create_catalog();

    let mut simple = catalog.query("User").expect("实体应该存在");
    simple.has("posts", Operator::Gte, 1, Boolean::And, None).expect("分派应该成功");

    let mut counted = catalog.query("Post").expect("实体应该存在");
    counted
        .with_count([
            CountRelation::from("comments"),
            CountRelation::from("approvedComments as approved"),
            CountRelation::from("author"),
        ])
        .expect("计数应该成功");

    let mut morph = catalog.query("Image").expect("实体应该存在");
    morph
        .has_morph("imageable", &["Post", "Team"], Operator::Gte, 1, Boolean::And)
        .expect("多态分派应该成功");

    let test_cases = vec![
        ("simple", simple.into_plan()),
        ("with_count", counted.into_plan()),
        ("has_morph", morph.into_plan()),
    ];

    let mut group = c.benchmark_group("sql_compiler_performance");
    let compiler = SqlCompiler::for_driver(relation_dispatcher::Driver::Mysql);

    for (name, plan) in test_cases {
        group.bench_with_input(BenchmarkId::new("compile", name), &plan, |b, plan| {
            b.iter(|| match compiler.to_sql(black_box(plan)) {
                Ok(sql) => black_box(sql),
                Err(_) => panic!("编译失败"),
            })
        });
    }

    group.finish();
}

// 基准测试：完整的端到端处理
fn benchmark_end_to_end(c: &mut Criterion) {
    let catalog = create_catalog();
    let mut group = c.benchmark_group("end_to_end_performance");

    for depth in [1usize, 2, 3] {
        let path = ["posts", "comments", "post"][..depth].join(".");
        group.bench_with_input(BenchmarkId::new("nested_to_sql", depth), &path, |b, path| {
            b.iter(|| {
                let mut query = catalog.query("User").expect("实体应该存在");
                query
                    .has(black_box(path), Operator::Gte, 1, Boolean::And, None)
                    .expect("分派应该成功");
                black_box(query.to_sql().expect("编译应该成功"))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_dispatch, benchmark_sql_compiler, benchmark_end_to_end);
criterion_main!(benches);
