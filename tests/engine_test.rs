use tensordb::core::bytes::f32_to_bytes;
use tensordb::core::schema::DEFAULT_DTYPE;
use tensordb::exec::{ExecOptions, RelationalStore, ScriptExecutor, SqlOutcome};
use tensordb::{CancelToken, EngineError, TensorDb, TensorSchema};

fn temp_dir(tag: &str) -> String {
    let dir = format!("/tmp/tensordb_test_engine_{}", tag);
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_tensor_state_survives_reopen() {
    let dir = temp_dir("reopen");
    let cancel = CancelToken::new();

    {
        let db = TensorDb::open_at(&dir).unwrap();
        db.create_tensor(
            "w",
            TensorSchema::with_chunks(vec![2, 2], DEFAULT_DTYPE, vec![2, 2]),
        )
        .unwrap();
        db.store_chunk("w", &[0, 0], &f32_to_bytes(&[1.0, 2.0, 3.0, 4.0]), &cancel)
            .unwrap();
        db.set_tensor_metadata("w", "stage", serde_json::json!("trained"))
            .unwrap();
    }

    let db = TensorDb::open_at(&dir).unwrap();
    assert_eq!(db.list_tensors(), vec!["w".to_string()]);

    let tensor = db.read_tensor("w").unwrap();
    assert_eq!(tensor.data(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(tensor.schema.metadata["stage"], serde_json::json!("trained"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_reshape_survives_reopen() {
    let dir = temp_dir("reshape");
    {
        let db = TensorDb::open_at(&dir).unwrap();
        db.create_tensor("t", TensorSchema::dense(vec![2, 3], DEFAULT_DTYPE))
            .unwrap();
        db.reshape_tensor("t", vec![6]).unwrap();
    }

    let db = TensorDb::open_at(&dir).unwrap();
    assert_eq!(db.describe_tensor("t").unwrap().shape, vec![6]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_drop_removes_blob_and_record() {
    let dir = temp_dir("drop");
    let db = TensorDb::open_at(&dir).unwrap();

    db.create_tensor("gone", TensorSchema::dense(vec![4], DEFAULT_DTYPE))
        .unwrap();
    assert!(std::path::Path::new(&format!("{}/tensor_gone.bin", dir)).exists());
    assert!(std::path::Path::new(&format!("{}/tensor_gone.meta.json", dir)).exists());

    db.drop_tensor("gone").unwrap();
    assert!(!std::path::Path::new(&format!("{}/tensor_gone.bin", dir)).exists());
    assert!(!std::path::Path::new(&format!("{}/tensor_gone.meta.json", dir)).exists());

    // Nothing comes back after a reopen.
    drop(db);
    let db = TensorDb::open_at(&dir).unwrap();
    assert!(db.list_tensors().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_strict_run_stops_before_executing() {
    let dir = temp_dir("strict");
    let db = TensorDb::open_at(&dir).unwrap();
    let mut exec = ScriptExecutor::new(db);

    // The CREATE is valid but the script has a validation error, so strict
    // mode refuses to execute anything.
    let source = "CREATE TENSOR a (shape [2], dtype float32);\nMATRIX_MULTIPLY(a);\n";
    let report = exec.run_script(source, ExecOptions { batch: false });

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.executed, 0);
    assert!(exec.db().list_tensors().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_batch_run_keeps_going() {
    let dir = temp_dir("batch");
    let db = TensorDb::open_at(&dir).unwrap();
    let mut exec = ScriptExecutor::new(db);

    let source = "\
CREATE TENSOR a (shape [2], dtype float32);
TRANSPOSE(ghost);
CREATE TENSOR b (shape [3], dtype float32);
SHOW TENSORS;
";
    let report = exec.run_script(source, ExecOptions { batch: true });

    // The unknown-tensor error is collected, everything else still runs.
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.executed, 3);
    assert_eq!(
        exec.db().list_tensors(),
        vec!["a".to_string(), "b".to_string()]
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_sql_skipped_without_relational_store() {
    let dir = temp_dir("skip_sql");
    let db = TensorDb::open_at(&dir).unwrap();
    let mut exec = ScriptExecutor::new(db);

    let source = "\
-- head
SELECT * FROM users;
CREATE TENSOR e (shape [2, 3], dtype float32);
SHOW TENSORS;
";
    let report = exec.run_script(source, ExecOptions::default());

    assert!(report.is_ok());
    assert_eq!(report.statements, 4);
    assert_eq!(report.skipped_sql, 1);
    assert_eq!(report.executed, 2);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Test double standing in for the relational engine.
struct RecordingStore {
    statements: Vec<String>,
}

impl RelationalStore for RecordingStore {
    fn execute(&mut self, statement: &str) -> Result<SqlOutcome, EngineError> {
        self.statements.push(statement.to_string());
        Ok(SqlOutcome {
            affected: 1,
            ..SqlOutcome::default()
        })
    }
}

#[test]
fn test_sql_forwards_to_relational_store() {
    let dir = temp_dir("forward_sql");
    let db = TensorDb::open_at(&dir).unwrap();
    let mut exec =
        ScriptExecutor::new(db).with_relational(Box::new(RecordingStore { statements: vec![] }));

    let source = "SELECT * FROM users;\nCREATE TENSOR e (shape [2], dtype float32);\n";
    let report = exec.run_script(source, ExecOptions::default());

    assert!(report.is_ok());
    assert_eq!(report.skipped_sql, 0);
    assert_eq!(report.executed, 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_duplicate_create_reports_already_exists() {
    let dir = temp_dir("duplicate");
    let db = TensorDb::open_at(&dir).unwrap();
    let mut exec = ScriptExecutor::new(db);

    exec.execute_line("CREATE TENSOR t (shape [2], dtype float32);")
        .unwrap();
    let err = exec
        .execute_line("CREATE TENSOR t (shape [2], dtype float32);")
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_concurrent_reads_during_kernels() {
    use std::sync::Arc;

    let dir = temp_dir("concurrent");
    let db = Arc::new(TensorDb::open_at(&dir).unwrap());
    let cancel = CancelToken::new();

    db.create_tensor("m", TensorSchema::dense(vec![8, 8], DEFAULT_DTYPE))
        .unwrap();
    db.store_chunk("m", &[0, 0], &f32_to_bytes(&[1.0; 64]), &cancel)
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let db = Arc::clone(&db);
        let cancel = cancel.clone();
        handles.push(std::thread::spawn(move || {
            let op = tensordb::Operation::Transpose;
            for _ in 0..16 {
                let out = db.apply("m", &op, &cancel).unwrap();
                assert_eq!(out.shape(), &[8, 8]);
                // Enumeration is never blocked by kernel reads.
                assert_eq!(db.list_tensors(), vec!["m".to_string()]);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let _ = std::fs::remove_dir_all(&dir);
}
