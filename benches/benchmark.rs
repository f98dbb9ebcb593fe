use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scenarist::{Template, Value};

const INPUT: &str =
    r#"order {{id}}: {{ total + items[0].price * 2 <= limit ? "ok" : "over budget" }}"#;

const DATA: &str = r#"
id: "42"
total: 700
limit: 1000
items:
  - price: 100
  - price: 250
"#;

fn template_benchmark(c: &mut Criterion) {
    c.bench_function("parse", |b| {
        b.iter(|| {
            Template::new(black_box(INPUT)).unwrap();
        })
    });

    c.bench_function("execute", |b| {
        let template = Template::new(INPUT).unwrap();
        let yaml: serde_yaml::Value = serde_yaml::from_str(DATA).unwrap();
        let data: Value = scenarist::from_yaml(yaml).unwrap();
        b.iter(|| {
            template.execute(black_box(&data)).unwrap();
        })
    });
}

criterion_group!(benches, template_benchmark);
criterion_main!(benches);
