use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use reldoc::builder::ObjectBuilder;
use reldoc::datatype::StandardType;
use reldoc::memory::MemoryStore;
use reldoc::reader::TreeNode;
use reldoc::repository::Repository;
use reldoc::schema::{RelationalTypeDefinition, TypeDefinitionBuilder};

struct Catalogue {
    color: RelationalTypeDefinition,
    article: RelationalTypeDefinition,
}

fn catalogue(repository: &Repository) -> Catalogue {
    let color = TypeDefinitionBuilder::new("Color")
        .referencable()
        .field("name", StandardType::Name)
        .field("displayName", repository.localized_string().expect("localized string"))
        .build(repository)
        .expect("color");
    let shape = TypeDefinitionBuilder::new("Shape")
        .field("kind", StandardType::String)
        .reference("color", &color)
        .field("sides", StandardType::Long)
        .build(repository)
        .expect("shape");
    let article = TypeDefinitionBuilder::new("Article")
        .referencable()
        .field("title", StandardType::String)
        .field("shape", &shape)
        .repeatable("tags", StandardType::String)
        .build(repository)
        .expect("article");
    ObjectBuilder::new(&color)
        .set("reference", "red")
        .and_then(|b| b.set("name", "red"))
        .and_then(|b| b.set_localized("displayName", "en", "Red"))
        .and_then(|b| b.build(repository))
        .expect("red");
    Catalogue { color, article }
}

fn build_article(repository: &Repository, types: &Catalogue, n: usize) {
    let shape = types
        .article
        .field_by_name("shape")
        .expect("shape field")
        .value_type()
        .clone();
    ObjectBuilder::new(&types.article)
        .set("reference", format!("article-{}", n))
        .and_then(|b| b.set("title", "Bracket"))
        .and_then(|b| {
            b.set_object(
                "shape",
                ObjectBuilder::new(shape)
                    .set("kind", "triangle")?
                    .set("color", "red")?
                    .set("sides", 3i64)?,
            )
        })
        .and_then(|b| b.add("tags", "hardware"))
        .and_then(|b| b.add("tags", "steel"))
        .and_then(|b| b.build(repository))
        .expect("article");
}

fn walk<'r>(node: &impl TreeNode<'r>) -> usize {
    let mut count = 1;
    for (_, item) in node.items().expect("items") {
        count += walk(&item);
    }
    count
}

fn build_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.bench_function("sqlite", |b| {
        let repository = Repository::in_memory().expect("repository");
        let types = catalogue(&repository);
        let mut n = 0;
        b.iter(|| {
            n += 1;
            build_article(&repository, &types, n)
        })
    });
    group.bench_function("memory", |b| {
        let repository = Repository::open(Box::new(MemoryStore::new())).expect("repository");
        let types = catalogue(&repository);
        let mut n = 0;
        b.iter(|| {
            n += 1;
            build_article(&repository, &types, n)
        })
    });
    group.finish();
}

fn read_benchmark(c: &mut Criterion) {
    let repository = Repository::in_memory().expect("repository");
    let types = catalogue(&repository);
    for n in 0..100 {
        build_article(&repository, &types, n);
    }
    let red = repository
        .find("red", types.color.descriptor())
        .expect("lookup")
        .expect("red");
    c.bench_function("read localized", |b| {
        b.iter(|| {
            let view = repository.reader(black_box(&red)).expect("view");
            view.get_localized("displayName", "en").expect("localized")
        })
    });
    c.bench_function("walk all articles", |b| {
        b.iter(|| {
            let mut nodes = 0;
            for entity in repository.all_of(types.article.descriptor()).expect("articles") {
                nodes += walk(&repository.reader(&entity).expect("view"));
            }
            black_box(nodes)
        })
    });
}

criterion_group!(benches, build_benchmark, read_benchmark);
criterion_main!(benches);
