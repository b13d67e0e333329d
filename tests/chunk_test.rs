use tensordb::core::bytes::f32_to_bytes;
use tensordb::core::schema::DEFAULT_DTYPE;
use tensordb::{CancelToken, EngineError, TensorDb, TensorSchema};

fn open_db(tag: &str) -> (TensorDb, String) {
    let dir = format!("/tmp/tensordb_test_chunks_{}", tag);
    let _ = std::fs::remove_dir_all(&dir);
    (TensorDb::open_at(&dir).unwrap(), dir)
}

#[test]
fn test_chunk_store_fetch_round_trip() {
    let (db, dir) = open_db("round_trip");
    let cancel = CancelToken::new();

    db.create_tensor(
        "grid",
        TensorSchema::with_chunks(vec![4, 4], DEFAULT_DTYPE, vec![2, 2]),
    )
    .unwrap();

    // Four distinct 16-byte payloads, one per chunk coordinate.
    let payloads = [
        ([0, 0], [1.0f32, 2.0, 3.0, 4.0]),
        ([0, 1], [5.0, 6.0, 7.0, 8.0]),
        ([1, 0], [9.0, 10.0, 11.0, 12.0]),
        ([1, 1], [13.0, 14.0, 15.0, 16.0]),
    ];
    for (indices, values) in &payloads {
        db.store_chunk("grid", indices, &f32_to_bytes(values), &cancel)
            .unwrap();
    }

    let fetched = db.get_chunk("grid", &[0, 1]).unwrap();
    assert_eq!(fetched, f32_to_bytes(&[5.0, 6.0, 7.0, 8.0]));

    // Overwrite and fetch again: the last store wins.
    db.store_chunk("grid", &[0, 1], &f32_to_bytes(&[50.0, 60.0, 70.0, 80.0]), &cancel)
        .unwrap();
    let fetched = db.get_chunk("grid", &[0, 1]).unwrap();
    assert_eq!(fetched, f32_to_bytes(&[50.0, 60.0, 70.0, 80.0]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_chunk_round_trip_for_every_coordinate() {
    let (db, dir) = open_db("exhaustive");
    let cancel = CancelToken::new();

    db.create_tensor(
        "t",
        TensorSchema::with_chunks(vec![6, 4], DEFAULT_DTYPE, vec![2, 4]),
    )
    .unwrap();

    for i in 0..3 {
        let values: Vec<f32> = (0..8).map(|k| (i * 100 + k) as f32).collect();
        let payload = f32_to_bytes(&values);
        db.store_chunk("t", &[i, 0], &payload, &cancel).unwrap();
        assert_eq!(db.get_chunk("t", &[i, 0]).unwrap(), payload);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_chunk_error_kinds() {
    let (db, dir) = open_db("errors");
    let cancel = CancelToken::new();

    db.create_tensor(
        "t",
        TensorSchema::with_chunks(vec![4, 4], DEFAULT_DTYPE, vec![2, 2]),
    )
    .unwrap();
    let good = f32_to_bytes(&[1.0, 2.0, 3.0, 4.0]);

    let err = db.store_chunk("missing", &[0, 0], &good, &cancel).unwrap_err();
    assert!(matches!(err, EngineError::UnknownTensor(_)));

    let err = db.store_chunk("t", &[0], &good, &cancel).unwrap_err();
    assert!(matches!(err, EngineError::ShapeMismatch(_)));

    let err = db.store_chunk("t", &[0, 2], &good, &cancel).unwrap_err();
    assert!(matches!(err, EngineError::ChunkOutOfRange(_)));

    let err = db.store_chunk("t", &[0, 0], &good[..7], &cancel).unwrap_err();
    assert!(matches!(err, EngineError::BadPayload(_)));

    let err = db
        .store_chunk("t", &[0, 0], &f32_to_bytes(&[1.0, 2.0]), &cancel)
        .unwrap_err();
    assert!(matches!(err, EngineError::BadPayload(_)));

    let err = db
        .store_chunk("t", &[0, 0], &f32_to_bytes(&[1.0, f32::INFINITY, 0.0, 0.0]), &cancel)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidValue(_)));

    let err = db.get_chunk("t", &[9, 0]).unwrap_err();
    assert!(matches!(err, EngineError::ChunkOutOfRange(_)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_blob_layout_on_disk() {
    let (db, dir) = open_db("layout");
    let cancel = CancelToken::new();

    db.create_tensor("flat", TensorSchema::dense(vec![3], DEFAULT_DTYPE))
        .unwrap();
    db.store_chunk("flat", &[0], &f32_to_bytes(&[1.5, -2.0, 8.0]), &cancel)
        .unwrap();

    // Raw buffer, native order, no header: 4 bytes per element.
    let raw = std::fs::read(format!("{}/tensor_flat.bin", dir)).unwrap();
    assert_eq!(raw, f32_to_bytes(&[1.5, -2.0, 8.0]));

    let _ = std::fs::remove_dir_all(&dir);
}
