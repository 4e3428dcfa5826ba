//! End-to-end batch runs: detections manifest on disk → sidecars on disk.

use std::fs;

use subject_crop::config::{self, CropperConfig};
use subject_crop::process::{self, ImageStatus, ProcessEvent, ProcessSettings};
use subject_crop::sidecar;
use tempfile::TempDir;

const MANIFEST: &str = r#"{
  "images": [
    {
      "path": "IMG_0001.CR3",
      "width": 1000,
      "height": 600,
      "detections": [
        { "box": [0.40, 0.30, 0.60, 0.70], "confidence": 0.91, "label": "person" },
        { "box": [0.05, 0.10, 0.25, 0.90], "confidence": 0.60, "label": "person" }
      ]
    },
    {
      "path": "IMG_0002.CR3",
      "width": 6000,
      "height": 4000,
      "detections": [
        { "box": [0.10, 0.10, 0.20, 0.30], "confidence": 0.20, "label": "person" }
      ]
    },
    { "path": "day2/IMG_0003.jpg", "width": 4000, "height": 6000, "detections": [
        { "box": [0.30, 0.20, 0.70, 0.95], "confidence": 0.88 }
      ]
    }
  ]
}"#;

const EXISTING: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/" xmp:Rating="3"/>
 </rdf:RDF>
</x:xmpmeta>
"#;

fn setup() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("day2")).unwrap();
    for image in ["IMG_0001.CR3", "IMG_0002.CR3", "day2/IMG_0003.jpg"] {
        fs::write(tmp.path().join(image), b"").unwrap();
    }
    fs::write(tmp.path().join("IMG_0001.CR3.xmp"), EXISTING).unwrap();
    fs::write(tmp.path().join("detections.json"), MANIFEST).unwrap();
    tmp
}

fn settings(overlay: &str, dry_run: bool) -> ProcessSettings {
    let overlay: toml::Value = toml::from_str(overlay).unwrap();
    let config: CropperConfig =
        config::resolve_config(config::stock_defaults_value(), Some(overlay)).unwrap();
    ProcessSettings::from_config(&config, dry_run).unwrap()
}

fn status_of<'a>(report: &'a process::ProcessReport, name: &str) -> &'a ImageStatus {
    &report
        .outcomes
        .iter()
        .find(|o| o.image.ends_with(name))
        .unwrap()
        .status
}

#[test]
fn batch_writes_sidecars_and_reports_in_order() {
    let tmp = setup();
    let settings = settings("", false);

    let (tx, rx) = std::sync::mpsc::channel();
    let report =
        process::process_file(&tmp.path().join("detections.json"), &settings, Some(tx)).unwrap();
    let events: Vec<ProcessEvent> = rx.into_iter().collect();

    assert_eq!(events.len(), 4);
    assert!(matches!(
        events[0],
        ProcessEvent::Started {
            image_count: 3,
            dry_run: false
        }
    ));

    let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(report.counts.written, 2);
    assert_eq!(report.counts.no_subject, 1);
    assert_eq!(report.counts.failed, 0);
    assert_eq!(report.counts.to_string(), "2 written, 1 no subject, 0 failed");

    // Existing sidecar: merged and backed up, rating kept.
    let first = tmp.path().join("IMG_0001.CR3.xmp");
    assert!(matches!(
        status_of(&report, "IMG_0001.CR3"),
        ImageStatus::Written { backup: Some(_), .. }
    ));
    assert_eq!(
        fs::read_to_string(sidecar::backup_path(&first)).unwrap(),
        EXISTING
    );
    let written = fs::read_to_string(&first).unwrap();
    assert!(written.contains(r#"xmp:Rating="3""#));
    let crop = sidecar::load(&first).unwrap().crop().unwrap();
    assert!((crop.left() - 0.37).abs() < 1e-6);
    assert!((crop.right() - 0.63).abs() < 1e-6);

    // Below the confidence threshold: nothing written.
    assert_eq!(status_of(&report, "IMG_0002.CR3"), &ImageStatus::NoSubject);
    assert!(!tmp.path().join("IMG_0002.CR3.xmp").exists());

    // New sidecar in a subdirectory, no backup.
    let third = tmp.path().join("day2/IMG_0003.jpg.xmp");
    assert!(matches!(
        status_of(&report, "IMG_0003.jpg"),
        ImageStatus::Written { backup: None, .. }
    ));
    assert!(sidecar::load(&third).unwrap().crop().is_some());
}

#[test]
fn dry_run_computes_crops_without_writing() {
    let tmp = setup();
    let settings = settings("", true);

    let report =
        process::process_file(&tmp.path().join("detections.json"), &settings, None).unwrap();

    assert_eq!(report.counts.dry_run, 2);
    assert_eq!(report.counts.written, 0);
    assert!(report.outcomes[0].crop.is_some());
    assert_eq!(
        fs::read_to_string(tmp.path().join("IMG_0001.CR3.xmp")).unwrap(),
        EXISTING
    );
    assert!(!tmp.path().join("IMG_0001.CR3.xmp.bak").exists());
    assert!(!tmp.path().join("day2/IMG_0003.jpg.xmp").exists());
}

#[test]
fn preset_and_overrides_shape_the_batch() {
    let tmp = setup();
    let out = tmp.path().join("xmp-out");
    let overlay = format!(
        "preset = \"sports\"\n[detection]\nmin_confidence = 0.1\n[sidecar]\noutput_dir = {:?}\n",
        out.to_string_lossy()
    );
    let settings = settings(&overlay, false);
    assert_eq!(settings.strategy.as_str(), "largest");

    let report =
        process::process_file(&tmp.path().join("detections.json"), &settings, None).unwrap();
    assert_eq!(report.counts.written, 3);

    // Largest subject in IMG_0001 is the second detection.
    let first = &report.outcomes[0];
    let subject = first.subject.as_ref().unwrap();
    assert!((subject.confidence() - 0.60).abs() < 1e-12);

    // Everything lands in the output directory; sources are untouched.
    for name in ["IMG_0001.CR3.xmp", "IMG_0002.CR3.xmp", "IMG_0003.jpg.xmp"] {
        assert!(out.join(name).exists(), "missing {name}");
    }
    assert_eq!(
        fs::read_to_string(tmp.path().join("IMG_0001.CR3.xmp")).unwrap(),
        EXISTING
    );
    let merged = fs::read_to_string(out.join("IMG_0001.CR3.xmp")).unwrap();
    assert!(merged.contains(r#"xmp:Rating="3""#));
}

#[test]
fn missing_manifest_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let result = process::process_file(
        &tmp.path().join("nope.json"),
        &settings("", false),
        None,
    );
    assert!(result.is_err());
}

#[test]
fn output_dir_never_lets_two_images_share_a_sidecar() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    for dir in ["day1", "day2"] {
        fs::create_dir_all(tmp.path().join(dir)).unwrap();
        fs::write(tmp.path().join(dir).join("IMG_1.jpg"), b"").unwrap();
    }
    let manifest = r#"{"images": [
        {"path": "day1/IMG_1.jpg", "width": 1000, "height": 600,
         "detections": [{"box": [0.40, 0.30, 0.60, 0.70], "confidence": 0.9}]},
        {"path": "day2/IMG_1.jpg", "width": 1000, "height": 600,
         "detections": [{"box": [0.05, 0.10, 0.25, 0.90], "confidence": 0.9}]}
    ]}"#;
    fs::write(tmp.path().join("detections.json"), manifest).unwrap();
    let overlay = format!("[sidecar]\noutput_dir = {:?}\n", out.to_string_lossy());

    let report = process::process_file(
        &tmp.path().join("detections.json"),
        &settings(&overlay, false),
        None,
    )
    .unwrap();

    assert_eq!(report.counts.written, 1);
    assert_eq!(report.counts.failed, 1);
    assert!(matches!(status_of(&report, "day2/IMG_1.jpg"), ImageStatus::Failed(_)));

    // The surviving sidecar holds day1's crop, and nothing was backed up.
    let crop = sidecar::load(&out.join("IMG_1.jpg.xmp")).unwrap().crop().unwrap();
    assert_eq!(Some(crop), report.outcomes[0].crop.map(|c| c.region));
    assert!(!out.join("IMG_1.jpg.xmp.bak").exists());
}
