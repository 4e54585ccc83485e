use index_crawler::crawl::decode_batch;
use index_crawler::decode::decode;
use index_crawler::output::{read_table, write_table};
use index_crawler::series::{DateRange, Granularity, materialize};
use index_crawler::services::index_api::{EncryptedBatch, KeywordGroup};
use index_crawler::stats::averages_by_year;
use index_crawler::table::join;
use serde::Deserialize;

#[derive(Deserialize)]
struct Fixture {
    start: String,
    end: String,
    key_table: String,
    unique_id: String,
    labels: Vec<String>,
    payloads: Vec<String>,
    expected: Vec<Vec<f64>>,
    yearly: Vec<Vec<(i32, f64)>>,
}

fn fixture() -> Fixture {
    serde_json::from_str(include_str!("fixtures/captured_batch.json"))
        .expect("Failed to parse fixture")
}

#[test]
fn test_full_pipeline() {
    let fx = fixture();
    let range = DateRange::parse(&fx.start, &fx.end).unwrap();
    assert_eq!(range.granularity(), Granularity::Daily);

    let series: Vec<_> = fx
        .labels
        .iter()
        .zip(&fx.payloads)
        .map(|(label, payload)| {
            let plain = decode(&fx.key_table, payload).unwrap();
            materialize(&range, &plain, label).unwrap()
        })
        .collect();

    for (s, expected) in series.iter().zip(&fx.expected) {
        let values: Vec<f64> = s.records.iter().map(|r| r.value).collect();
        assert_eq!(&values, expected);
    }

    for (s, expected) in series.iter().zip(&fx.yearly) {
        let yearly: Vec<(i32, f64)> = averages_by_year(s)
            .into_iter()
            .map(|y| (y.year, y.average))
            .collect();
        assert_eq!(&yearly, expected);
    }

    let table = join(&series).unwrap();
    assert_eq!(table.row_count(), 5);
    assert_eq!(table.column_count(), 3);

    let path = std::env::temp_dir().join("index_crawler_integration.csv");
    write_table(&path, &table).unwrap();
    assert_eq!(read_table(&path).unwrap(), table);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_decode_batch_matches_manual_pipeline() {
    let fx = fixture();
    let range = DateRange::parse(&fx.start, &fx.end).unwrap();
    let groups: Vec<_> = fx
        .labels
        .iter()
        .map(|l| KeywordGroup::new([l.as_str()]).unwrap())
        .collect();
    let batch = EncryptedBatch {
        key_table: fx.key_table.clone(),
        payloads: fx.payloads.clone(),
        unique_id: fx.unique_id.clone(),
    };

    let series = decode_batch(&groups, &range, &batch).unwrap();

    assert_eq!(series.len(), 2);
    assert_eq!(series[1].label, "悟空");
    assert_eq!(series[1].records[3].value, 10.0);
}

#[test]
fn test_key_from_another_request_is_rejected() {
    let fx = fixture();
    // a key issued for a different request shares no cipher symbols
    assert!(decode("ABCDEFGHIJK1234567890,", &fx.payloads[0]).is_err());
}
