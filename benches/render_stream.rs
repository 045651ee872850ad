use chatbot_relay::ui::markdown::{render, RenderedMessage};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn make_reply(sections: usize) -> String {
    let mut text = String::new();
    for i in 0..sections {
        text.push_str(&format!("## Section {i}\n"));
        text.push_str("Some **bold** text, a bit of *emphasis* and `inline code` ");
        text.push_str("with a [link](https://example.com/docs) at the end.\n\n");
        text.push_str("* first point\n* second point\n* third point\n\n");
        text.push_str("| name | value |\n| a | 1 |\n| b | 2 |\n\n");
        text.push_str("```rust\nfn main() {\n    println!(\"hi\");\n}\n```\n\n");
        text.push_str("> quoted remark\n\n");
    }
    text
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split_inclusive(' ').collect()
}

fn bench_render_stream(c: &mut Criterion) {
    for sections in [1usize, 4, 16] {
        let reply = make_reply(sections);
        let tokens = tokenize(&reply);

        let mut group = c.benchmark_group(format!("render_sections{sections}"));
        group.throughput(Throughput::Bytes(reply.len() as u64));

        group.bench_function(BenchmarkId::new("one_shot", tokens.len()), |b| {
            b.iter(|| render(black_box(&reply)))
        });

        // Every token re-renders the whole buffer, as the widget does while streaming
        group.bench_function(BenchmarkId::new("token_by_token", tokens.len()), |b| {
            b.iter(|| {
                let mut message = RenderedMessage::new();
                for token in &tokens {
                    message.push_str(black_box(token));
                }
                message
            })
        });

        group.finish();
    }
}

criterion_group!(benches, bench_render_stream);
criterion_main!(benches);
