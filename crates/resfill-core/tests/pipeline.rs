//! End-to-end runs with a scripted model and generated documents.

use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pretty_assertions::assert_eq;

use resfill_core::error::ModelError;
use resfill_core::template::{CellRef, LAYOUT_V1, MISSING_MARKER, Workbook};
use resfill_core::{
    BatchRunner, CancelFlag, CompletionModel, ExtractionRequest, FailureStage, Pipeline,
    PipelineConfig, discover_documents, write_default_template,
};

const FULL_REPLY: &str = r#"{
  "basic": {"name": "李雷", "vendor": "猎头A"},
  "personal": {
    "gender": "男", "birth_date": "1990-05", "phone": "13800138000",
    "email": "lilei@example.com", "registered_residence": "北京",
    "current_residence": "上海", "marital_status": "已婚"
  },
  "education": [
    {"school": "清华大学", "major": "计算机科学", "degree": "硕士",
     "enrollment_date": "2012-09", "graduation_date": "2015-06"}
  ],
  "work_experience": [
    {"company": "某科技公司", "title": "高级工程师", "start_date": "2015-07",
     "end_date": "至今", "description": "负责检索服务"}
  ],
  "projects": [
    {"name": "检索平台", "role": "负责人", "start_date": "2019-01",
     "end_date": "2020-12", "description": "分布式检索"}
  ],
  "skills": ["Rust", "Kafka"],
  "certifications": ["PMP"]
}"#;

const NO_PHONE_REPLY: &str = r#"{
  "basic": {"name": "李雷", "vendor": ""},
  "personal": {"gender": "男", "phone": "", "email": "lilei@example.com"},
  "education": [{"school": "清华大学", "major": "", "degree": "硕士",
                 "enrollment_date": "", "graduation_date": ""}],
  "work_experience": [],
  "projects": [],
  "skills": [],
  "certifications": []
}"#;

enum Step {
    Reply(String),
    Hang,
}

/// Plays back a fixed script; the last step repeats.
struct Scripted {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<u32>,
}

impl Scripted {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(0),
        })
    }

    fn replying(reply: &str) -> Arc<Self> {
        Self::new(vec![Step::Reply(reply.to_string())])
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CompletionModel for Scripted {
    async fn complete(&self, _request: &ExtractionRequest) -> Result<String, ModelError> {
        *self.calls.lock().unwrap() += 1;
        let reply = {
            let mut steps = self.steps.lock().unwrap();
            let step = if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().map(|s| match s {
                    Step::Reply(text) => Step::Reply(text.clone()),
                    Step::Hang => Step::Hang,
                })
            };
            match step {
                Some(Step::Reply(text)) => Some(text),
                _ => None,
            }
        };
        match reply {
            Some(text) => Ok(text),
            None => std::future::pending().await,
        }
    }
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

fn pdf(text: &str) -> Vec<u8> {
    save(pdf_document(text))
}

/// A real page behind a standard security handler with a non-empty user
/// password.
fn password_protected_pdf(text: &str) -> Vec<u8> {
    let mut doc = pdf_document(text);
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "P" => -4,
        "O" => Object::string_literal(vec![0x11u8; 32]),
        "U" => Object::string_literal(vec![0x22u8; 32]),
    });
    doc.trailer.set("Encrypt", encrypt_id);
    doc.trailer.set(
        "ID",
        vec![
            Object::string_literal(vec![0x33u8; 16]),
            Object::string_literal(vec![0x33u8; 16]),
        ],
    );
    save(doc)
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn pdf_document(text: &str) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

struct Fixture {
    dir: tempfile::TempDir,
    template: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.xlsx");
        write_default_template(&template).unwrap();
        Self { dir, template }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn pipeline(&self, config: PipelineConfig, model: Arc<Scripted>) -> Pipeline {
        Pipeline::new(config, model, Duration::from_millis(200)).with_template(&self.template)
    }
}

fn quiet_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry.backoff_ms = 0;
    config.template.stamp_generated_at = false;
    config
}

fn open_output(path: &Path) -> Workbook {
    Workbook::open(std::fs::read(path).unwrap(), LAYOUT_V1.sheet_part).unwrap()
}

fn cell(reference: &str) -> CellRef {
    CellRef::parse(reference).unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn docx_without_phone_flags_only_the_phone_cell() {
    let fx = Fixture::new();
    let source = fx.write("李雷.docx", &docx(&["姓名：李雷", "清华大学 硕士"]));
    let out_dir = fx.path("out");

    let pipeline = fx.pipeline(quiet_config(), Scripted::replying(NO_PHONE_REPLY));
    let report = pipeline.run_document(&source, &out_dir).await.unwrap();

    assert_eq!(report.candidate, "李雷");
    assert_eq!(report.output, out_dir.join("李雷_filled.xlsx"));
    let unresolved: Vec<String> = report.unresolved.iter().map(|p| p.to_string()).collect();
    assert!(unresolved.contains(&"personal.phone".to_string()));
    assert!(!unresolved.iter().any(|p| p.starts_with("education[0].degree")));
    assert!(!unresolved.contains(&"education[0].school".to_string()));

    let workbook = open_output(&report.output);
    assert_eq!(workbook.cell_text(cell("B3")).as_deref(), Some("李雷"));
    assert_eq!(workbook.cell_text(cell("B6")).as_deref(), Some(MISSING_MARKER));
    assert_eq!(workbook.cell_text(cell("E11")).as_deref(), Some("硕士"));
    assert_eq!(workbook.cell_text(cell("D8")).as_deref(), Some("硕士"));

    let plain = workbook.sheet.style(cell("B3"));
    assert_ne!(workbook.sheet.style(cell("B6")), plain);
    assert_eq!(workbook.sheet.style(cell("E11")), workbook.sheet.style(cell("C11")));
    assert_eq!(workbook.sheet.style(cell("C11")), plain);
}

#[tokio::test]
async fn password_protected_pdf_in_directory_fails_alone() {
    let fx = Fixture::new();
    fx.write("batch/a.pdf", &pdf("Li Lei resume"));
    fx.write("batch/b.pdf", &pdf("Han Meimei resume"));
    fx.write("batch/c.pdf", &password_protected_pdf("Wang Wu resume"));

    let files = discover_documents(&fx.path("batch"), false).unwrap();
    assert_eq!(files.len(), 3);

    let pipeline = Arc::new(fx.pipeline(quiet_config(), Scripted::replying(FULL_REPLY)));
    let mut seen = 0;
    let summary = BatchRunner::new(pipeline)
        .with_jobs(2)
        .run(files, None, |_| seen += 1)
        .await;

    assert_eq!(seen, 3);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.partial(), 0);
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.failed[0].path, fx.path("batch/c.pdf"));
    assert_eq!(summary.failed[0].stage, FailureStage::Unreadable);

    assert_eq!(
        files_in(&fx.path("batch")),
        vec!["a.pdf", "a_filled.xlsx", "b.pdf", "b_filled.xlsx", "c.pdf"]
    );
}

#[tokio::test]
async fn fenced_reply_is_fully_resolved() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["李雷", "13800138000"]));
    let reply = format!("好的，以下是提取结果：\n```json\n{FULL_REPLY}\n```\n");

    let model = Scripted::new(vec![Step::Reply(reply)]);
    let report = fx
        .pipeline(quiet_config(), model)
        .run_document(&source, &fx.path("out"))
        .await
        .unwrap();

    assert!(report.is_complete(), "unresolved: {:?}", report.unresolved);
    let workbook = open_output(&report.output);
    assert_eq!(workbook.cell_text(cell("B15")).as_deref(), Some("至今"));
    assert_eq!(workbook.cell_text(cell("B22")).as_deref(), Some("Rust、Kafka"));
}

#[tokio::test]
async fn two_timeouts_then_success() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["李雷"]));
    let out_dir = fx.path("out");

    let model = Scripted::new(vec![Step::Hang, Step::Hang, Step::Reply(FULL_REPLY.into())]);
    let report = fx
        .pipeline(quiet_config(), model.clone())
        .run_document(&source, &out_dir)
        .await
        .unwrap();

    assert_eq!(report.model_attempts, 3);
    assert_eq!(model.calls(), 3);
    assert_eq!(report.candidate, "李雷");
    assert_eq!(files_in(&out_dir), vec!["resume_filled.xlsx"]);
}

#[tokio::test]
async fn exhausted_retries_fail_in_extraction_without_output() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["李雷"]));
    let out_dir = fx.path("out");

    let mut config = quiet_config();
    config.retry.max_retries = 1;
    let model = Scripted::new(vec![Step::Hang]);
    let err = fx
        .pipeline(config, model.clone())
        .run_document(&source, &out_dir)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), FailureStage::Extraction);
    assert_eq!(model.calls(), 2);
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn repeated_runs_produce_identical_bytes() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["李雷"]));

    let mut outputs = Vec::new();
    for run in ["first", "second"] {
        let pipeline = fx.pipeline(quiet_config(), Scripted::replying(FULL_REPLY));
        let report = pipeline.run_document(&source, &fx.path(run)).await.unwrap();
        outputs.push(std::fs::read(report.output).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn missing_name_fails_extraction() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["简历"]));
    let reply = r#"{"basic": {"name": "未提及"}, "skills": ["Rust"]}"#;

    let err = fx
        .pipeline(quiet_config(), Scripted::replying(reply))
        .run_document(&source, &fx.path("out"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), FailureStage::Extraction);
    assert!(!fx.path("out").join("resume_filled.xlsx").exists());
}

#[tokio::test]
async fn json_sidecar_written_when_enabled() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["李雷"]));

    let mut config = quiet_config();
    config.output.write_json = true;
    let report = fx
        .pipeline(config, Scripted::replying(FULL_REPLY))
        .run_document(&source, &fx.path("out"))
        .await
        .unwrap();

    let sidecar = report.record_output.unwrap();
    assert_eq!(sidecar, fx.path("out").join("resume_parsed.json"));
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(sidecar).unwrap()).unwrap();
    assert_eq!(json["basic"]["name"]["resolved"], "李雷");
}

#[tokio::test]
async fn cancelled_batch_skips_everything() {
    let fx = Fixture::new();
    let files = vec![
        fx.write("a.docx", &docx(&["甲"])),
        fx.write("b.docx", &docx(&["乙"])),
    ];

    let cancel = CancelFlag::new();
    cancel.cancel();
    let model = Scripted::replying(FULL_REPLY);
    let summary = BatchRunner::new(Arc::new(fx.pipeline(quiet_config(), model.clone())))
        .with_cancel_flag(cancel)
        .run(files.clone(), None, |_| {})
        .await;

    assert_eq!(summary.skipped, files);
    assert_eq!(summary.total(), 2);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn inputs_sharing_a_stem_get_separate_outputs() {
    let fx = Fixture::new();
    fx.write("batch/张三.pdf", &pdf("Zhang San resume"));
    fx.write("batch/张三.docx", &docx(&["张三"]));
    fx.write("batch/nested/张三.docx", &docx(&["张三"]));
    let out_dir = fx.path("out");

    let files = discover_documents(&fx.path("batch"), true).unwrap();
    assert_eq!(files.len(), 3);

    let pipeline = Arc::new(fx.pipeline(quiet_config(), Scripted::replying(FULL_REPLY)));
    let summary = BatchRunner::new(pipeline)
        .with_jobs(3)
        .run(files, Some(&out_dir), |_| {})
        .await;

    assert_eq!(summary.succeeded(), 3);
    let mut outputs: Vec<PathBuf> = summary.completed.iter().map(|r| r.output.clone()).collect();
    outputs.sort();
    outputs.dedup();
    assert_eq!(outputs.len(), 3);
    assert_eq!(
        files_in(&out_dir),
        vec!["张三_docx_2_filled.xlsx", "张三_docx_filled.xlsx", "张三_pdf_filled.xlsx"]
    );
}

#[tokio::test]
async fn failed_spreadsheet_write_leaves_no_sidecar() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["李雷"]));
    let out_dir = fx.path("out");
    // A directory where the spreadsheet should go makes the final rename fail.
    fx.write("out/resume_filled.xlsx/keep", b"");

    let mut config = quiet_config();
    config.output.write_json = true;
    let err = fx
        .pipeline(config, Scripted::replying(FULL_REPLY))
        .run_document(&source, &out_dir)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), FailureStage::Output);
    assert!(!out_dir.join("resume_parsed.json").exists());
}

#[tokio::test]
async fn failed_sidecar_write_removes_the_spreadsheet() {
    let fx = Fixture::new();
    let source = fx.write("resume.docx", &docx(&["李雷"]));
    let out_dir = fx.path("out");
    fx.write("out/resume_parsed.json/keep", b"");

    let mut config = quiet_config();
    config.output.write_json = true;
    let err = fx
        .pipeline(config, Scripted::replying(FULL_REPLY))
        .run_document(&source, &out_dir)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), FailureStage::Output);
    assert!(!out_dir.join("resume_filled.xlsx").exists());
}
