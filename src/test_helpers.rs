//! Shared test utilities for the subject-crop test suite.
//!
//! Builders for detections and XMP fixtures, so unit tests read as the
//! scenario they check rather than as constructor boilerplate.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let subject = detection((0.4, 0.3, 0.6, 0.7), 0.9);
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = write_file(tmp.path(), "IMG_0001.CR3.xmp", LIGHTROOM_XMP);
//! ```

use std::path::{Path, PathBuf};

use crate::geometry::{BoundingBox, CropRegion, Detection};

// =========================================================================
// Geometry builders
// =========================================================================

/// A "person" detection with the given `(left, top, right, bottom)` box.
pub fn detection(b: (f64, f64, f64, f64), confidence: f64) -> Detection {
    let bbox = BoundingBox::new(b.0, b.1, b.2, b.3).unwrap();
    Detection::new(bbox, confidence, "person").unwrap()
}

pub fn region(l: f64, t: f64, r: f64, b: f64) -> CropRegion {
    CropRegion::new(l, t, r, b).unwrap()
}

// =========================================================================
// XMP fixtures
// =========================================================================

/// A sidecar as Lightroom writes it: Camera Raw settings as attributes,
/// unrelated metadata as child elements, an existing crop.
pub const LIGHTROOM_XMP: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/" x:xmptk="Adobe XMP Core 7.0-c000">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:crs="http://ns.adobe.com/camera-raw-settings/1.0/"
   xmp:Rating="4"
   crs:Version="15.0"
   crs:Exposure2012="+0.35"
   crs:HasCrop="True"
   crs:CropTop="0.100000"
   crs:CropLeft="0.200000"
   crs:CropBottom="0.900000"
   crs:CropRight="0.800000"
   crs:CropAngle="0">
   <dc:subject>
    <rdf:Bag>
     <rdf:li>ceremony</rdf:li>
     <rdf:li>first kiss</rdf:li>
    </rdf:Bag>
   </dc:subject>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>
"#;

/// A sidecar without any Camera Raw namespace, self-closing description.
pub const PLAIN_XMP: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/" xmp:Rating="2"/>
 </rdf:RDF>
</x:xmpmeta>
"#;

/// Crop fields stored as child elements rather than attributes.
pub const ELEMENT_FORM_XMP: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about="" xmlns:crs="http://ns.adobe.com/camera-raw-settings/1.0/">
   <crs:HasCrop>False</crs:HasCrop>
   <crs:CropTop>0</crs:CropTop>
   <crs:CropLeft>0</crs:CropLeft>
   <crs:CropBottom>1</crs:CropBottom>
   <crs:CropRight>1</crs:CropRight>
   <crs:Temperature>5200</crs:Temperature>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
"#;

// =========================================================================
// Filesystem
// =========================================================================

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}
