use criterion::{Criterion, black_box, criterion_group, criterion_main};
use delve_core::extract::extract;
use delve_core::reasoning::{strip, strip_assembled};
use delve_core::research::{Subtask, Suggestion};
use delve_core::stream::StreamAccumulator;
use delve_core::types::DeltaEvent;

fn subtask_payload(count: usize) -> String {
    let records: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"id":"task-{i}","title":"Subtask {i}","description":"Investigate aspect {i} of the topic in depth."}}"#
            )
        })
        .collect();
    format!("{{\"subtasks\":[{}]}}", records.join(","))
}

fn bench_accumulator(c: &mut Criterion) {
    let reasoning: Vec<String> = (0..200).map(|i| format!("step {i} of reasoning ")).collect();
    let content: Vec<String> = subtask_payload(8)
        .chars()
        .collect::<Vec<_>>()
        .chunks(12)
        .map(|c| c.iter().collect())
        .collect();

    c.bench_function("accumulate_reasoning_then_content", |b| {
        b.iter(|| {
            let mut acc = StreamAccumulator::new();
            for r in &reasoning {
                acc.push(DeltaEvent::reasoning(r.as_str()));
            }
            for chunk in &content {
                acc.push(DeltaEvent::content(chunk.as_str()));
            }
            black_box(acc.finish())
        })
    });

    let inline = format!("<think>{}</think>{}", reasoning.concat(), content.concat());
    let inline_chunks: Vec<String> = inline
        .chars()
        .collect::<Vec<_>>()
        .chunks(12)
        .map(|c| c.iter().collect())
        .collect();
    c.bench_function("accumulate_inline_markers", |b| {
        b.iter(|| {
            let mut acc = StreamAccumulator::new();
            for chunk in &inline_chunks {
                acc.push(DeltaEvent::content(chunk.as_str()));
            }
            black_box(acc.finish())
        })
    });
}

fn bench_stripper(c: &mut Criterion) {
    let closed = format!("<think>{}</think>\n{}", "deliberation ".repeat(500), subtask_payload(8));
    c.bench_function("strip_closed_segment", |b| {
        b.iter(|| strip(black_box(&closed)))
    });

    let unterminated = format!(
        "<think>{}<think>more{}",
        "deliberation ".repeat(500),
        subtask_payload(8)
    );
    c.bench_function("strip_unterminated_segment", |b| {
        b.iter(|| strip(black_box(&unterminated)))
    });

    let mut acc = StreamAccumulator::new();
    acc.push(DeltaEvent::content(unterminated.as_str()));
    let assembled = acc.finish();
    c.bench_function("strip_assembled_recovery", |b| {
        b.iter(|| strip_assembled(black_box(&assembled)).answer.len())
    });
}

fn bench_extractor(c: &mut Criterion) {
    let bare = subtask_payload(8);
    c.bench_function("extract_bare_subtasks", |b| {
        b.iter(|| extract::<Subtask>(black_box(&bare)))
    });

    let fenced = format!(
        "Here is the decomposition you asked for.\n```json\n{}\n```\nLet me know if anything is missing.",
        subtask_payload(8)
    );
    c.bench_function("extract_fenced_subtasks", |b| {
        b.iter(|| extract::<Subtask>(black_box(&fenced)))
    });

    let prose = format!(
        "Sure! {} Hope that helps.",
        r#"{"suggestions":[{"title":"Solar","description":"PV costs."},{"title":"Wind","description":"Offshore."}]}"#
    );
    c.bench_function("extract_suggestions_amid_prose", |b| {
        b.iter(|| extract::<Suggestion>(black_box(&prose)))
    });
}

criterion_group!(benches, bench_accumulator, bench_stripper, bench_extractor);
criterion_main!(benches);
