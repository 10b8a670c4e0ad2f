use super::*;

fn row(pairs: &[(&str, &str)]) -> RawRow {
    RawRow::from_pairs(pairs.iter().copied())
}

fn meta<'a>(record: &'a Record, key: &str) -> &'a str {
    record
        .metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("metadata key {} missing", key))
}

#[test]
fn verse_row_normalizes() {
    let normalizer = RecordNormalizer::new(RecordFamily::Verses);
    let record = normalizer.normalize(
        &row(&[
            ("source_id", "BG2.47"),
            ("sanskrit", "karmaṇy evādhikāras te"),
            ("translation", "Perform your duty..."),
            ("chapter", "2"),
            ("verse", "47"),
        ]),
        0,
    );

    assert_eq!(record.id, "BG2.47");
    assert_eq!(record.text, "karmaṇy evādhikāras te\nPerform your duty...");
    assert_eq!(meta(&record, "chapter"), "2");
    assert_eq!(meta(&record, "verse"), "47");
    assert_eq!(meta(&record, "tags"), "");
    assert_eq!(meta(&record, "source"), "verses");
    assert_eq!(meta(&record, "type"), "verse");
    assert_eq!(meta(&record, "id"), "BG2.47");
}

#[test]
fn family_id_column_wins_over_generic() {
    let normalizer = RecordNormalizer::new(RecordFamily::Practices);
    let record = normalizer.normalize(
        &row(&[("id", "generic"), ("practice_id", "P-7"), ("message", "x")]),
        3,
    );
    assert_eq!(record.id, "P-7");
}

#[test]
fn positional_id_fallback() {
    let normalizer = RecordNormalizer::new(RecordFamily::Commentary);
    let record = normalizer.normalize(&row(&[("summary", "On duty")]), 4);
    assert_eq!(record.id, "commentary_5");
}

#[test]
fn id_is_sanitized_and_bounded() {
    let normalizer = RecordNormalizer::new(RecordFamily::Verses);
    let record = normalizer.normalize(&row(&[("id", "  BG 2 \t 47 ")]), 0);
    assert_eq!(record.id, "BG_2_47");

    let long = "x".repeat(250);
    let record = normalizer.normalize(&row(&[("id", long.as_str())]), 0);
    assert_eq!(record.id.chars().count(), MAX_ID_LENGTH);
}

#[test]
fn ids_are_deterministic() {
    let normalizer = RecordNormalizer::new(RecordFamily::Practices);
    let input = row(&[("title", "Breath"), ("message", "pause and breathe")]);

    let first = normalizer.normalize(&input, 9);
    let second = normalizer.normalize(&input, 9);
    assert_eq!(first.id, second.id);
    assert_eq!(first, second);
}

#[test]
fn header_aliases_are_matched_loosely() {
    let normalizer = RecordNormalizer::new(RecordFamily::Verses);
    let record = normalizer.normalize(
        &row(&[
            ("Verse ID", "BG 3.19"),
            ("English Translation", "Therefore, without attachment..."),
            ("Chapter-No", "3"),
        ]),
        0,
    );

    assert_eq!(record.id, "BG_3.19");
    assert_eq!(record.text, "Therefore, without attachment...");
    assert_eq!(meta(&record, "chapter"), "3");
    // original headers are preserved verbatim
    assert_eq!(meta(&record, "English Translation"), "Therefore, without attachment...");
}

#[test]
fn text_column_priority_and_empty_skipping() {
    let normalizer = RecordNormalizer::new(RecordFamily::Verses);
    let record = normalizer.normalize(
        &row(&[
            ("summary", "Act without clinging"),
            ("translation", ""),
            ("hinglish", "Bas apna kaam karo"),
            ("sanskrit", "कर्मण्येवाधिकारस्ते"),
        ]),
        0,
    );

    assert_eq!(
        record.text,
        "कर्मण्येवाधिकारस्ते\nBas apna kaam karo\nAct without clinging"
    );
}

#[test]
fn unrecognized_columns_fall_back_to_join_all() {
    let normalizer = RecordNormalizer::new(RecordFamily::Practices);
    let record = normalizer.normalize(&row(&[("foo", "alpha"), ("bar", ""), ("baz", "beta")]), 1);

    assert_eq!(record.text, "alpha | beta");
    assert_eq!(record.id, "practices_2");
    assert_eq!(meta(&record, "foo"), "alpha");
    assert_eq!(meta(&record, "title"), "");
}

#[test]
fn fallback_text_is_bounded() {
    let normalizer = RecordNormalizer::new(RecordFamily::Practices);
    let long = "y".repeat(5000);
    let record = normalizer.normalize(&row(&[("blob", long.as_str())]), 0);
    assert_eq!(record.text.chars().count(), MAX_FALLBACK_TEXT_LENGTH);
}

#[test]
fn empty_row_still_has_text_and_id() {
    let normalizer = RecordNormalizer::new(RecordFamily::Commentary);
    let record = normalizer.normalize(&RawRow::new(), 0);
    assert_eq!(record.id, "commentary_1");
    assert!(!record.text.is_empty());

    let record = normalizer.normalize(&row(&[("a", " "), ("b", "")]), 2);
    assert!(!record.id.is_empty());
    assert!(!record.text.is_empty());
}

#[test]
fn practice_metadata_keeps_original_fields() {
    let normalizer = RecordNormalizer::new(RecordFamily::Practices);
    let record = normalizer.normalize(
        &row(&[("practice_text", "pause and breathe"), ("tags", "anger,calm")]),
        0,
    );

    assert_eq!(meta(&record, "type"), "practice");
    assert_eq!(meta(&record, "practice_text"), "pause and breathe");
    assert_eq!(meta(&record, "tags"), "anger,calm");
    assert_eq!(record.text, "pause and breathe");
}

#[test]
fn duplicate_ids_are_kept_in_order() {
    let normalizer = RecordNormalizer::new(RecordFamily::Verses);
    let rows = vec![
        row(&[("id", "BG1.1"), ("translation", "first")]),
        row(&[("id", "BG1.1"), ("translation", "second")]),
    ];
    let records = normalizer.normalize_all(&rows);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].text, "second");
}

#[test]
fn family_parsing() {
    assert_eq!("Verses".parse::<RecordFamily>(), Ok(RecordFamily::Verses));
    assert_eq!("practice".parse::<RecordFamily>(), Ok(RecordFamily::Practices));
    assert!("hymns".parse::<RecordFamily>().is_err());
    assert_eq!(RecordFamily::Commentary.to_string(), "commentary");
}

#[test]
fn header_normalization() {
    assert_eq!(normalize_header("English Translation"), "english_translation");
    assert_eq!(normalize_header("\u{feff}Verse-No"), "verse_no");
    assert_eq!(normalize_header("  source__id "), "source_id");
}

#[test]
fn csv_reading_handles_ragged_rows() {
    let data = "source_id,translation,chapter\nBG2.47,Perform your duty,2\nBG2.48,Be steadfast\n,,\n";
    let rows = read_rows_from_reader(data.as_bytes()).expect("csv should parse");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].resolve(&["chapter"]), Some("2"));
    assert_eq!(rows[1].resolve(&["chapter"]), None);
    assert_eq!(rows[1].resolve(&["translation"]), Some("Be steadfast"));
}

#[test]
fn byte_order_mark_is_dropped_from_metadata_keys() {
    let normalizer = RecordNormalizer::new(RecordFamily::Verses);
    let record = normalizer.normalize(
        &row(&[("\u{feff}source_id", "BG2.47"), ("translation", "Perform your duty...")]),
        0,
    );

    assert_eq!(record.id, "BG2.47");
    assert_eq!(meta(&record, "source_id"), "BG2.47");
    assert!(!record.metadata.contains_key("\u{feff}source_id"));
}

#[test]
fn byte_order_mark_is_dropped_from_csv_headers() {
    let data = "\u{feff}source_id,translation\nBG2.47,Perform your duty...\n";

    let rows = read_rows_from_reader(data.as_bytes()).expect("csv should parse");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].columns()[0].0, "source_id");
}

#[test]
fn csv_reading_from_file() {
    let temp_dir = tempfile::TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("practices.csv");
    std::fs::write(&path, "title,message\nBreath,pause and breathe\n")
        .expect("should write csv");

    let rows = read_rows(&path).expect("should read csv file");
    assert_eq!(rows.len(), 1);

    let missing = read_rows(temp_dir.path().join("missing.csv"));
    assert!(missing.is_err());
}
