//! End-to-end validation over directories of dataset files.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use imu_capture::{
    AggregatorOptions, QualityAggregator, Status, ValidationConfig, AGGREGATE_SOURCE,
    CHECK_PACKET_LOSS, TIME_FORMAT,
};
use tempfile::TempDir;

const HEADER: &str = "index,acc_x,acc_y,acc_z,gyro_x,gyro_y,gyro_z,datetime,label";

/// One row per index, 40 ms apart (25 Hz) from `start`.
fn write_dataset(dir: &Path, name: &str, start: NaiveDateTime, indices: &[i64]) {
    let mut content = String::from(HEADER);
    content.push('\n');
    for (i, index) in indices.iter().enumerate() {
        let ts = start + TimeDelta::milliseconds(40 * i as i64);
        content.push_str(&format!(
            "{index},0.01,-0.02,9.81,0.5,0.25,-0.125,{},walk\n",
            ts.format(TIME_FORMAT)
        ));
    }
    std::fs::write(dir.join(name), content).unwrap();
}

fn start(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn three_clean_files() -> TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let indices: Vec<i64> = (0..100).collect();
    write_dataset(tmp.path(), "walk_a.csv", start(9), &indices);
    write_dataset(tmp.path(), "walk_b.csv", start(10), &indices);
    write_dataset(tmp.path(), "walk_c.csv", start(11), &indices);
    tmp
}

fn aggregator() -> QualityAggregator {
    QualityAggregator::new(AggregatorOptions::from(&ValidationConfig::default()))
}

#[test]
fn clean_files_produce_no_errors() {
    let tmp = three_clean_files();
    let report = aggregator().run(tmp.path()).unwrap();

    assert!(!report.has_errors(), "{:#?}", report.findings());
    for source in ["walk_a.csv", "walk_b.csv", "walk_c.csv", AGGREGATE_SOURCE] {
        let packet_loss: Vec<_> = report
            .for_source(source)
            .filter(|f| f.check == CHECK_PACKET_LOSS)
            .collect();
        assert_eq!(packet_loss.len(), 1, "{source}");
        assert_eq!(packet_loss[0].status, Status::Ok);
    }
}

#[test]
fn corrupted_sequence_is_attributed_to_its_file() {
    let tmp = three_clean_files();
    // Drop index 50 from the middle file; keep 25 rows per second by
    // appending one extra sample at the end.
    let mut indices: Vec<i64> = (0..101).collect();
    indices.remove(50);
    write_dataset(tmp.path(), "walk_b.csv", start(10), &indices);

    let report = aggregator().run(tmp.path()).unwrap();

    let losses: Vec<_> = report
        .findings()
        .iter()
        .filter(|f| f.check == CHECK_PACKET_LOSS && f.status == Status::Error)
        .collect();
    let per_file: Vec<&str> = losses
        .iter()
        .filter(|f| f.source != AGGREGATE_SOURCE)
        .map(|f| f.source.as_str())
        .collect();
    assert_eq!(per_file, vec!["walk_b.csv"]);
    assert!(losses[0].details.contains("[50]"));

    // The merged pass sees the same gap and no false gaps at file boundaries.
    let merged: Vec<_> = losses
        .iter()
        .filter(|f| f.source == AGGREGATE_SOURCE)
        .collect();
    assert_eq!(merged.len(), 1);
    assert!(merged[0].details.contains("[150]"));
}

#[test]
fn slow_second_fails_odr_for_that_file_only() {
    let tmp = three_clean_files();
    let mut content = String::from(HEADER);
    content.push('\n');
    // One second with 25 samples, then one with 20.
    let mut index = 0;
    for (second, n) in [(0i64, 25i64), (1, 20)] {
        for k in 0..n {
            let ts = start(12) + TimeDelta::seconds(second) + TimeDelta::milliseconds(k * 1000 / n);
            content.push_str(&format!(
                "{index},0,0,0,0,0,0,{},walk\n",
                ts.format(TIME_FORMAT)
            ));
            index += 1;
        }
    }
    std::fs::write(tmp.path().join("walk_slow.csv"), content).unwrap();

    let report = aggregator().run(tmp.path()).unwrap();
    let odr_errors: Vec<&str> = report
        .findings()
        .iter()
        .filter(|f| f.check == "ODR" && f.status == Status::Error)
        .map(|f| f.source.as_str())
        .collect();
    assert_eq!(odr_errors, vec!["walk_slow.csv", AGGREGATE_SOURCE]);
}

#[test]
fn report_renders_sections_in_file_order() {
    let tmp = three_clean_files();
    let report = aggregator().run(tmp.path()).unwrap();

    let out = tempfile::tempdir().unwrap();
    let paths = report.write_to(out.path(), "DATA_check_test").unwrap();
    let markdown = std::fs::read_to_string(&paths[0]).unwrap();

    let a = markdown.find("| Filename | info | walk_a.csv |").unwrap();
    let b = markdown.find("| Filename | info | walk_b.csv |").unwrap();
    let merged = markdown.find("| Filename | info | After merging |").unwrap();
    assert!(a < b && b < merged);
    assert_eq!(markdown.matches("| ---------------- |").count(), 4);
}
