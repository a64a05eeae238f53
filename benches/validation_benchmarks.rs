//! Performance benchmarks for the validation hot path
//!
//! Targets:
//! - Single task validation: <50µs for a 60-question task
//! - Full battery per student: <1ms
//! - Merge: <10ms for 1,000 raw records

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dokimasia::{
    FieldValue, MergedRecord, Question, RawRecord, RecordMerger, ResolvedValue, ScalarValue,
    SchoolYear, Source, StageGate, StudentId, TaskCatalog, TaskDefinition, TaskId, TaskValidator,
    TerminationRule,
};

fn battery() -> TaskCatalog {
    let staged = TaskDefinition {
        task_id: TaskId::new("vocab"),
        title: "Vocabulary".to_string(),
        questions: (0..60).map(|i| Question::scored(format!("vocab_q{}", i + 1), "1")).collect(),
        termination: TerminationRule::StageGates {
            stages: (0..5)
                .map(|_| StageGate {
                    questions: 12,
                    threshold: 5,
                })
                .collect(),
        },
        shared_window: None,
    };
    let streak = TaskDefinition {
        task_id: TaskId::new("memory"),
        title: "Memory Span".to_string(),
        questions: (0..40).map(|i| Question::scored(format!("memory_q{}", i + 1), "1")).collect(),
        termination: TerminationRule::ConsecutiveIncorrect { threshold: 10 },
        shared_window: None,
    };
    let timed = TaskDefinition {
        task_id: TaskId::new("naming"),
        title: "Rapid Naming".to_string(),
        questions: (0..56).map(|i| Question::scored(format!("naming_q{}", i + 1), "1")).collect(),
        termination: TerminationRule::TimedWindow,
        shared_window: None,
    };
    TaskCatalog::new(vec![staged, streak, timed], vec![]).unwrap()
}

fn student_record(catalog: &TaskCatalog) -> MergedRecord {
    let mut record = MergedRecord::new(StudentId::new("bench-student"), SchoolYear(2024));
    for task in catalog.tasks() {
        for (i, question) in task.questions.iter().enumerate() {
            // Mixed answers with a trailing unanswered run
            if i % 7 == 6 || i > task.questions.len() * 3 / 4 {
                continue;
            }
            let answer = if i % 3 == 0 { "1" } else { "2" };
            record.fields.insert(
                question.id.clone(),
                ResolvedValue {
                    value: ScalarValue::Text(answer.to_string()),
                    winning_source: Source::FormSubmission,
                    winning_timestamp: Utc::now(),
                },
            );
        }
    }
    record
}

fn bench_validate_task(c: &mut Criterion) {
    let catalog = battery();
    let record = student_record(&catalog);
    let task = catalog.tasks().first().unwrap();

    let mut group = c.benchmark_group("validate_task");
    group.throughput(Throughput::Elements(1));
    group.bench_function("staged_60_questions", |b| {
        b.iter(|| TaskValidator::validate_task(black_box(task), black_box(&record)));
    });
    group.finish();
}

fn bench_validate_all_tasks(c: &mut Criterion) {
    let catalog = battery();
    let record = student_record(&catalog);

    let mut group = c.benchmark_group("validate_all_tasks");
    group.throughput(Throughput::Elements(1));
    group.bench_function("full_battery", |b| {
        b.iter(|| TaskValidator::validate_all_tasks(black_box(&catalog), black_box(&record)));
    });
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("thousand_records", |b| {
        b.iter_batched(
            || {
                let mut source_a = Vec::new();
                let mut source_b = Vec::new();
                for i in 0..500u32 {
                    let ts = Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, i % 60).unwrap();
                    let student = format!("stu-{:04}", i % 250);
                    source_a.push(
                        RawRecord::new(Source::FormSubmission, ts)
                            .with_student(&student)
                            .with_field("assessment_date", FieldValue::text("2024-10-01"))
                            .with_field(format!("q{}", i % 40), FieldValue::text("1")),
                    );
                    source_b.push(
                        RawRecord::new(Source::SurveyExport, ts)
                            .with_student(&student)
                            .with_field("assessment_date", FieldValue::text("2024-10-01"))
                            .with_field(format!("q{}", i % 40), FieldValue::text("2")),
                    );
                }
                (source_a, source_b)
            },
            |(a, b)| RecordMerger::merge(black_box(a), black_box(b)),
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_validate_task,
    bench_validate_all_tasks,
    bench_merge
);
criterion_main!(benches);
