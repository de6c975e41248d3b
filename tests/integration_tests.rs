use edfcore::Timeline;
use edfcore::doctest_utils::{create_multi_channel_test_file, sine};
use edfcore::{Edf, EdfError, EngineConfig, ErrorKind, FileType, LabelAliases, EDF_TIME_DIMENSION};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// 测试文件放在临时目录中
fn scratch(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

#[test]
fn test_write_read_cycle() {
    let (_dir, path) = scratch("cycle.edf");

    let data = sine(5 * 256, 256.0, 10.0, 100.0);
    {
        let mut edf = Edf::empty("P001", 5, 1.0, "01.02.24", "08.30.00");
        edf.add_signal("EEG Fp1", 256.0, &data).unwrap();
        edf.write(&path, false).unwrap();
    }

    let mut edf = Edf::open(&path, "P001", &[]).unwrap();
    let header = edf.header();
    assert_eq!(header.ns(), 1);
    assert_eq!(header.record_count, 5);
    assert_eq!(header.record_duration, 1.0);
    assert_eq!(header.start_date, "01.02.24");
    assert_eq!(header.start_time, "08.30.00");
    assert_eq!(header.file_type, FileType::Edf);
    assert_eq!(header.signals[0].samples_per_record, 256);
    assert_eq!(edf.timeline().total_duration(), 5 * EDF_TIME_DIMENSION);

    // nothing decoded until asked for
    assert!(edf.records().is_empty());

    let read = edf.read_physical_slice(0, 5 * EDF_TIME_DIMENSION, 0, 1).unwrap();
    assert_eq!(read.len(), data.len());
}

#[test]
fn test_quantization_error_within_one_step() {
    let (_dir, path) = scratch("quant.edf");

    let data: Vec<f64> = (0..400).map(|i| (i as f64 * 0.37).sin() * 150.0 + (i % 7) as f64).collect();
    let mut edf = Edf::empty("q", 4, 1.0, "01.01.24", "00.00.00");
    edf.add_signal("X", 100.0, &data).unwrap();
    edf.write(&path, false).unwrap();

    let mut edf = Edf::open(&path, "q", &[]).unwrap();
    let signal = &edf.header().signals[0];
    let step = (signal.physical_max - signal.physical_min) / 65535.0;
    let read = edf.read_physical_slice(0, 4 * EDF_TIME_DIMENSION, 0, 1).unwrap();

    let worst = read
        .iter()
        .zip(&data)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(worst <= step, "worst error {} exceeds one step {}", worst, step);
}

#[test]
fn test_selective_attach_keeps_layout() {
    let (_dir, path) = scratch("multi.edf");
    create_multi_channel_test_file(&path, 4).unwrap();

    let mut full = Edf::open(&path, "all", &[]).unwrap();
    let emg_full = full.physical_signal(full.header().signal("EMG").unwrap()).unwrap();

    let mut edf = Edf::open(&path, "emg", &["EMG"]).unwrap();
    assert_eq!(edf.header().ns(), 1);
    assert_eq!(edf.header().channel_count_all, 4);
    assert_eq!(edf.header().signals[0].origin, Some(3));
    assert_eq!(edf.physical_signal(0).unwrap(), emg_full);

    let edf = Edf::open(&path, "mastoids", &["M*"]).unwrap();
    let labels: Vec<&str> = edf.header().signals.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["M1", "M2"]);
}

#[test]
fn test_aliases_applied_on_open() {
    let (_dir, path) = scratch("alias.edf");
    create_multi_channel_test_file(&path, 2).unwrap();

    let mut aliases = LabelAliases::new();
    aliases.add("A1", &["M1"]).unwrap();
    let config = EngineConfig::default().with_aliases(aliases);
    let edf = Edf::open_with(&path, "a", &[], config, edfcore::RecordTimeline::new()).unwrap();

    assert!(edf.header().label_index("A1").is_some());
    assert!(edf.header().label_index("M1").is_none());
    assert_eq!(edf.header().signal("M1").unwrap(), edf.header().signal("A1").unwrap());
    assert_eq!(edf.header().report_aliases(), vec![("A1", "M1")]);
}

#[test]
fn test_description_of_selected_channels() {
    let (_dir, path) = scratch("describe.edf");
    create_multi_channel_test_file(&path, 10).unwrap();

    let edf = Edf::open(&path, "subject-7", &["C4"]).unwrap();
    let text = edf.description();
    assert!(text.contains("ID                : subject-7"));
    assert!(text.contains("Clock time        : 23.30.00 - 23.30.09"));
    assert!(text.contains("Duration          : 00:00:10"));
    assert!(text.contains("# signals         : 1 selected (of 4)"));
    assert!(!text.contains("# EDF annotations"));
    assert!(text.contains("Signals           : C4[128]"));

    let edf = Edf::open(&path, "subject-7", &[]).unwrap();
    assert!(edf.description().contains("# signals         : 4\n"));
}

#[test]
fn test_slice_reports_time_points() {
    let (_dir, path) = scratch("slice.edf");
    create_multi_channel_test_file(&path, 3).unwrap();
    let mut edf = Edf::open(&path, "s", &["C4"]).unwrap();

    // 0.5s .. 1.5s at 128 Hz, every 4th sample
    let slice = edf.slice(EDF_TIME_DIMENSION / 2, 3 * EDF_TIME_DIMENSION / 2, 0, 4).unwrap();
    assert_eq!(slice.data.len(), 32);
    assert_eq!(slice.time_points[0], EDF_TIME_DIMENSION / 2);
    assert_eq!(slice.records.first(), Some(&0));
    assert_eq!(slice.records.last(), Some(&1));
    assert!(edf.loaded(0) && edf.loaded(1) && !edf.loaded(2));

    // beyond the end: empty, not an error
    let empty = edf.read_physical_slice(10 * EDF_TIME_DIMENSION, 11 * EDF_TIME_DIMENSION, 0, 1).unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_size_mismatch_is_fatal() {
    let (_dir, path) = scratch("truncated.edf");
    create_multi_channel_test_file(&path, 3).unwrap();

    // one extra record's worth of bytes
    let mut bytes = fs::read(&path).unwrap();
    let record_size = 2 * (128 * 3 + 256);
    bytes.extend(std::iter::repeat(0u8).take(record_size));
    fs::write(&path, &bytes).unwrap();

    match Edf::open(&path, "bad", &[]) {
        Err(EdfError::SizeMismatch { record_discrepancy, .. }) => {
            assert!((record_discrepancy - 1.0).abs() < 1e-9);
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("size mismatch not detected"),
    }
}

#[test]
fn test_open_failures() {
    let (dir, path) = scratch("short.edf");
    fs::write(&path, b"0       short").unwrap();
    let err = Edf::open(&path, "short", &[]).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Open);

    let missing = dir.path().join("missing.edf");
    let err = Edf::open(&missing, "missing", &[]).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Open);
}

#[test]
fn test_compressed_round_trip() {
    let (dir, path) = scratch("plain.edf");
    create_multi_channel_test_file(&path, 5).unwrap();

    let mut edf = Edf::open(&path, "z", &[]).unwrap();
    let edfz = dir.path().join("packed.edfz");
    edf.write(&edfz, true).unwrap();
    assert!(dir.path().join("packed.edfz.idx").exists());

    let mut packed = Edf::open(&edfz, "z", &[]).unwrap();
    assert_eq!(packed.header().record_count, 5);
    assert_eq!(packed.header().ns(), 4);
    for s in 0..4 {
        assert_eq!(packed.physical_signal(s).unwrap(), edf.physical_signal(s).unwrap());
    }

    // only the requested record is decoded
    let mut packed = Edf::open(&edfz, "z", &["C4"]).unwrap();
    packed.read_records(3, 3).unwrap();
    assert_eq!(packed.records().len(), 1);
    assert!(packed.loaded(3));
}

#[test]
fn test_missing_index_is_open_failure() {
    let (dir, path) = scratch("plain.edf");
    create_multi_channel_test_file(&path, 2).unwrap();
    let mut edf = Edf::open(&path, "z", &[]).unwrap();
    let edfz = dir.path().join("packed.edfz");
    edf.write(&edfz, true).unwrap();
    fs::remove_file(dir.path().join("packed.edfz.idx")).unwrap();

    let err = Edf::open(&edfz, "z", &[]).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Open);
}

#[test]
fn test_edf_plus_gets_time_track_on_open() {
    let (_dir, path) = scratch("plus.edf");
    let mut edf = Edf::empty("p", 3, 1.0, "01.01.24", "00.00.00");
    edf.add_signal("A", 2.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    edf.set_edfplus().unwrap();
    edf.drop_time_track().unwrap();
    assert_eq!(edf.header().file_type, FileType::EdfPlusC);
    edf.write(&path, false).unwrap();

    // an EDF+C file without any annotation channel
    let mut edf = Edf::open(&path, "p", &[]).unwrap();
    let t = edf.header().time_track().expect("time-track added");
    assert!(edf.header().signals[t].origin.is_none());
    edf.read_records(2, 2).unwrap();
    let payload = edf.records().get(2).unwrap().channels[t].annotation().unwrap();
    assert_eq!(&payload[..5], b"+2\x14\x14\x00");
}

#[test]
fn test_from_text_drops_partial_record() {
    let mut text = String::from("# X Y\n");
    for i in 0..9 {
        text.push_str(&format!("{}, {}\n", i, -i));
    }
    let mut edf = Edf::from_text(text.as_bytes(), "txt", 4.0, &[], "01.01.24", "00.00.00").unwrap();
    assert_eq!(edf.header().record_count, 2);
    assert_eq!(edf.header().signals[0].label, "X");
    let y = edf.header().signal("Y").unwrap();
    let data = edf.physical_signal(y).unwrap();
    assert_eq!(data.len(), 8);
    assert!((data[7] + 7.0).abs() < 1e-3);
}

#[test]
fn test_inverted_polarity_channel_accepts_edits() {
    let (_dir, path) = scratch("inverted.edf");
    let mut edf = Edf::empty("inv", 2, 1.0, "01.01.24", "00.00.00");
    edf.add_signal("X", 4.0, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
    edf.write(&path, false).unwrap();

    // 物理最小值 > 最大值 (反极性)
    let mut bytes = fs::read(&path).unwrap();
    bytes[360..376].copy_from_slice(b"200     -200    ");
    fs::write(&path, &bytes).unwrap();

    let mut edf = Edf::open(&path, "inv", &[]).unwrap();
    assert_eq!(edf.header().signals[0].physical_min, 200.0);
    assert_eq!(edf.header().signals[0].physical_max, -200.0);

    edf.update_records(0, 0, 0, &[1.0, 2.0, 3.0, 400.0]).unwrap();
    let data = edf.physical_signal(0).unwrap();
    assert!((data[0] - 1.0).abs() < 0.01);
    assert!((data[2] - 3.0).abs() < 0.01);
    // clipped to the upper bound of the range
    assert!((data[3] - 200.0).abs() < 0.01);

    edf.update_signal(0, &[-5.0; 8], false).unwrap();
    assert!(edf.physical_signal(0).unwrap().iter().all(|x| (x + 5.0).abs() < 0.01));
}
