use std::fs;

use tempfile::tempdir;

use experiment_summary::experiments;
use experiment_summary::source::{
    DelimitedSource, DelimitedSourceConfig, JsonLinesSource, JsonLinesSourceConfig, RecordSource,
    open_source,
};
use experiment_summary::transport::fs::{FileDiscovery, file_stem_label, source_id_for};
use experiment_summary::{
    CorrectionTable, ExperimentConfig, PipelineError, RecordSchema, StatisticSpec,
    SummaryPipeline, Value,
};

#[test]
fn headerless_search_space_file_is_paired_and_summarized() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("100_1_1_f.out");
    fs::write(
        &path,
        "40,50,60,dijkstra,forward\n\
         10,12,14,bidijkstra,forward\n\
         20,22,24,bidijkstra,backward\n\
         \n\
         44,54,64,dijkstra,forward\n\
         11,13,15,bidijkstra,forward\n\
         21,23,25,bidijkstra,backward\n",
    )
    .unwrap();

    let config = experiments::search_space();
    let source = open_source("100_1_1_f", &path, &config.input, Vec::new());
    let table = SummaryPipeline::new(config)
        .unwrap()
        .run(&[source])
        .unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(table.record_count(), 8);
    let totals = (0..table.len())
        .find(|&row| table.cell(row, "algorithm") == Some(Value::from("bidijkstra-total")))
        .unwrap();
    assert_eq!(table.cell(totals, "direction"), Some(Value::Missing));
    assert_eq!(table.cell(totals, "count"), Some(Value::from(2)));
    assert_eq!(table.cell(totals, "edges_traversed_mean"), Some(Value::from(39)));
    assert_eq!(table.cell(totals, "nodes_visited_mean"), Some(Value::from(31)));
}

#[test]
fn headed_files_tagged_per_generator_group_together() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("acceptance");
    fs::create_dir_all(&root).unwrap();
    fs::write(
        root.join("gnp.out"),
        "round,rate,initial,degree\n0,0.5,m,10\n0,0.7,m,10\n1,0.9,m,10\n",
    )
    .unwrap();
    fs::write(
        root.join("rhg.out"),
        "round,rate,initial,degree\n0,0.25,z,10\n",
    )
    .unwrap();
    fs::write(root.join("notes.txt"), "not a source").unwrap();

    let mut config = experiments::acceptance();
    config.group_by.insert(0, "gen".to_string());
    let sources: Vec<Box<dyn RecordSource>> = FileDiscovery::new(&root)
        .with_extensions(["out"])
        .discover()
        .unwrap()
        .into_iter()
        .map(|path| {
            open_source(
                source_id_for(&root, &path),
                &path,
                &config.input,
                vec![("gen".to_string(), file_stem_label(&path).into())],
            )
        })
        .collect();
    assert_eq!(sources.len(), 2);

    let table = SummaryPipeline::new(config).unwrap().run(&sources).unwrap();
    assert_eq!(
        table.columns(),
        ["gen", "degree", "initial", "round", "count", "rate_mean"]
    );
    assert_eq!(table.len(), 3);
    assert_eq!(table.cell(0, "gen"), Some(Value::from("gnp")));
    assert_eq!(table.cell(0, "count"), Some(Value::from(2)));
    assert_eq!(table.cell(0, "rate_mean"), Some(Value::from(0.6)));
    assert_eq!(table.cell(2, "gen"), Some(Value::from("rhg")));
}

#[test]
fn cycle_cover_json_lines_normalize_against_zero_steps() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("cover.jsonl");
    let mut text = String::new();
    for (nodes, steps, completion_run) in [
        (10, 0, "4"),
        (10, 0, "6"),
        (10, 5, "10"),
        (10, 5, "null"),
        (20, 0, "8"),
        (20, 10, "null"),
    ] {
        text.push_str(&format!(
            "{{\"nodes\":{nodes},\"steps\":{steps},\"runs\":3,\"count_of_frequencies\":[[1,3]],\"completion_run\":{completion_run},\"runtime_ms\":12}}\n"
        ));
    }
    fs::write(&path, text).unwrap();

    let config = experiments::cycle_cover();
    let source = open_source("cover", &path, &config.input, Vec::new());
    let table = SummaryPipeline::new(config).unwrap().run(&[source]).unwrap();

    // sorted by (nodes, steps)
    assert_eq!(table.len(), 4);
    assert_eq!(table.cell(0, "normalized"), Some(Value::from(1.0)));
    assert_eq!(table.cell(1, "steps_per_node"), Some(Value::from(0.5)));
    assert_eq!(table.cell(1, "normalized"), Some(Value::from(2.0)));
    assert_eq!(table.cell(1, "frac_coverage"), Some(Value::from(0.5)));
    assert_eq!(table.cell(3, "normalized"), Some(Value::Missing));
    assert_eq!(table.cell(3, "frac_coverage"), Some(Value::from(0.0)));
    assert!(table.diagnostics().is_empty());
}

#[test]
fn missing_source_aborts_the_run() {
    let temp = tempdir().unwrap();
    let config = experiments::insertions();
    let present = temp.path().join("gnp.out");
    fs::write(&present, "insertions,acc,algo\n1,acc,d\n").unwrap();
    let sources = vec![
        open_source("gnp", &present, &config.input, Vec::new()),
        open_source("rhg", temp.path().join("rhg.out"), &config.input, Vec::new()),
    ];
    let err = SummaryPipeline::new(config).unwrap().run(&sources).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingSource { ref source_id, .. } if source_id == "rhg"
    ));
}

#[test]
fn malformed_line_reports_source_and_line() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("1000_3_10.out");
    fs::write(&path, "4\n7\nseven\n9\n").unwrap();
    let config = experiments::complete_hops();
    let source = open_source("1000_3_10", &path, &config.input, Vec::new());
    let err = SummaryPipeline::new(config).unwrap().run(&[source]).unwrap_err();
    match err {
        PipelineError::MalformedRecord {
            source_id, line, ..
        } => {
            assert_eq!(source_id, "1000_3_10");
            assert_eq!(line, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn wrong_field_count_is_malformed() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("insertions.out");
    fs::write(&path, "insertions,acc,algo\n1,acc,d\n2,acc\n").unwrap();
    let source = DelimitedSource::new(DelimitedSourceConfig::headed("insertions", &path));
    let err = source.read_records().unwrap_err();
    assert!(matches!(err, PipelineError::MalformedRecord { line: 3, .. }));
}

#[test]
fn corrections_apply_before_grouping() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("dsf.out");
    fs::write(&path, "round,rate,initial,degree\n0,0.5,m,20\n0,0.7,m,10\n").unwrap();
    let config = ExperimentConfig::new("acceptance", ["gen", "degree"])
        .with_statistic(StatisticSpec::mean("rate"))
        .with_corrections(CorrectionTable::new().remap_when("degree", 20, 10, "gen", "dsf"))
        .with_min_support(1);
    let source = DelimitedSource::new(
        DelimitedSourceConfig::headed("dsf", &path).with_tag("gen", "dsf"),
    );
    let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(source)];
    let table = SummaryPipeline::new(config).unwrap().run(&sources).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.cell(0, "degree"), Some(Value::from(10)));
    assert_eq!(table.cell(0, "count"), Some(Value::from(2)));
}

#[test]
fn json_lines_and_headerless_sources_share_one_run() {
    let temp = tempdir().unwrap();
    let lines_path = temp.path().join("a.out");
    let json_path = temp.path().join("b.jsonl");
    fs::write(&lines_path, "3\n3\n").unwrap();
    fs::write(&json_path, "{\"hops\":3}\n{\"hops\":4}\n").unwrap();

    let config = ExperimentConfig::new("hops", ["hops"]).with_min_support(1);
    let schema = RecordSchema::new().number("hops");
    let sources: Vec<Box<dyn RecordSource>> = vec![
        Box::new(DelimitedSource::new(DelimitedSourceConfig::headerless(
            "a", &lines_path, schema,
        ))),
        Box::new(JsonLinesSource::new(JsonLinesSourceConfig::new("b", &json_path))),
    ];
    let table = SummaryPipeline::new(config).unwrap().run(&sources).unwrap();
    assert_eq!(table.column("count").unwrap(), vec![Value::from(3), Value::from(1)]);
}
