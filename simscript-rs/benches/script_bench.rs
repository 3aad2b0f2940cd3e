use criterion::{black_box, criterion_group, criterion_main, Criterion};
use simscript::lexer::Lexer;
use simscript::script::expr::{to_postfix, try_eval, EvalContext};

struct Vars;

impl EvalContext for Vars {
    fn get_var(&self, name: &str) -> Option<f64> {
        match name {
            "alt" => Some(3500.0),
            "target" => Some(4000.0),
            "gain" => Some(0.02),
            _ => None,
        }
    }
}

fn make_script(repeats: usize) -> String {
    let chunk = "var h <- sim(\"/instrumentation/heading-indicator/indicated-heading-deg\")\n\
                 while alt < target {\n\
                 \trudder = (h - 90) / 20\n\
                 \tPrint(\"climbing, hold on\")\n\
                 \tSleep(250)\n\
                 }\n";
    chunk.repeat(repeats)
}

fn bench_tokenize(c: &mut Criterion) {
    let lexer = Lexer::script();
    let small = make_script(10);
    let large = make_script(1000);

    let mut g = c.benchmark_group("tokenize");
    g.bench_function("small", |b| b.iter(|| lexer.tokenize(black_box(&small))));
    g.bench_function("large", |b| b.iter(|| lexer.tokenize(black_box(&large))));
    g.bench_function("build_and_small", |b| {
        b.iter(|| Lexer::script().tokenize(black_box(&small)))
    });
    g.finish();
}

fn bench_eval(c: &mut Criterion) {
    let simple = "(target-alt)*gain";
    let nested = "((target-alt)*gain+(-(alt/1000)))*((1+2)*(3-4)/5)";

    let mut g = c.benchmark_group("eval");
    g.bench_function("simple", |b| b.iter(|| try_eval(black_box(simple), &Vars)));
    g.bench_function("nested", |b| b.iter(|| try_eval(black_box(nested), &Vars)));
    g.bench_function("postfix_only", |b| b.iter(|| to_postfix(black_box(nested), &Vars)));
    g.finish();
}

criterion_group!(benches, bench_tokenize, bench_eval);
criterion_main!(benches);
