use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use kons::{Interpreter, Reader, tokenize};

const BENCH_INPUT: &str = r#"
(defun fib (n)
  ; nth Fibonacci number
  (if (< n 2)
      n
      (+ (fib (- n 1))
         (fib (- n 2)))))

(defun fact (n)
  (if (= n 0)
      1
      (* n (fact (- n 1)))))

(let* ((x 1) (y (+ x 1)))
  (list x y 'sym "string with \"escapes\"\n" 45.67 -10 '(a . b)))

(fib 10)
(fact 5)
"#;

fn bench_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reader");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );

    let interp = Interpreter::new();
    group.bench_with_input(BenchmarkId::new("read", "program"), &BENCH_INPUT, |b, input| {
        b.iter(|| Reader::new(&interp, black_box(input)).count())
    });

    group.finish();
}

fn bench_eval(c: &mut Criterion) {
    let interp = Interpreter::new();
    if let Err(err) = interp.load_str(BENCH_INPUT) {
        panic!("bench program failed to load: {err}");
    }
    let form = match interp.read_str("(fib 15)") {
        Ok(form) => form,
        Err(err) => panic!("bench form failed to read: {err}"),
    };

    c.bench_function("eval (fib 15)", |b| b.iter(|| interp.eval(black_box(&form))));
}

criterion_group!(benches, bench_reader, bench_eval);
criterion_main!(benches);
