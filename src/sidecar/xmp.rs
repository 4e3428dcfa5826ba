//! XMP packet parsing and byte-preserving crop edits.
//!
//! A [`SidecarDocument`] keeps the packet text exactly as read. Parsing only
//! records *where* the Camera Raw crop lives; merging splices new values into
//! those byte ranges and leaves everything else untouched. Nothing is ever
//! re-serialized from a tree, so comments, attribute order, indentation,
//! namespace prefixes and unknown metadata all survive a merge.
//!
//! ## Target description
//!
//! The crop is written into the first `rdf:Description` that already carries
//! Camera Raw settings (a `crs:` attribute or child property). Without one,
//! the first `rdf:Description` is used and the `crs` namespace is declared on
//! it if no ancestor declares it.
//!
//! ## Crop fields
//!
//! | Field          | Written value          |
//! |----------------|------------------------|
//! | `HasCrop`      | `True`                 |
//! | `CropTop`      | region top, 6 decimals |
//! | `CropLeft`     | region left            |
//! | `CropBottom`   | region bottom          |
//! | `CropRight`    | region right           |
//! | `CropAngle`    | `0`                    |
//!
//! Fields present as attributes are rewritten in place. Fields present as
//! child elements (`<crs:CropTop>0.1</crs:CropTop>`) stay child elements.
//! Missing fields are appended as attributes of the description start tag,
//! using the same whitespace that separates its existing attributes.

use std::ops::Range;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use crate::geometry::CropRegion;

/// Camera Raw settings namespace.
pub const CRS_NAMESPACE: &str = "http://ns.adobe.com/camera-raw-settings/1.0/";

const DEFAULT_CRS_PREFIX: &str = "crs";

/// New sidecars start from this packet. It holds no crop; merging adds one.
const TEMPLATE: &str = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>
<x:xmpmeta xmlns:x=\"adobe:ns:meta/\" x:xmptk=\"subject-crop\">
  <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">
    <rdf:Description rdf:about=\"\"
      xmlns:crs=\"http://ns.adobe.com/camera-raw-settings/1.0/\"
      crs:Version=\"15.0\"
      crs:ProcessVersion=\"11.0\">
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>
<?xpacket end=\"w\"?>
";

/// Not a well-formed XMP packet.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (at byte {position})")]
pub struct MalformedXmp {
    pub message: String,
    pub position: usize,
}

impl MalformedXmp {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CropField {
    HasCrop,
    Top,
    Left,
    Bottom,
    Right,
    Angle,
}

impl CropField {
    const ALL: [CropField; 6] = [
        CropField::HasCrop,
        CropField::Top,
        CropField::Left,
        CropField::Bottom,
        CropField::Right,
        CropField::Angle,
    ];

    fn local_name(self) -> &'static str {
        match self {
            CropField::HasCrop => "HasCrop",
            CropField::Top => "CropTop",
            CropField::Left => "CropLeft",
            CropField::Bottom => "CropBottom",
            CropField::Right => "CropRight",
            CropField::Angle => "CropAngle",
        }
    }

    fn from_local_name(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.local_name().as_bytes() == name)
    }

    /// Edges use the shortest decimal that parses back to the same `f64`,
    /// so a saved crop reloads bit-identical.
    fn value_for(self, crop: &CropRegion) -> String {
        match self {
            CropField::HasCrop => "True".to_string(),
            CropField::Top => crop.top().to_string(),
            CropField::Left => crop.left().to_string(),
            CropField::Bottom => crop.bottom().to_string(),
            CropField::Right => crop.right().to_string(),
            CropField::Angle => "0".to_string(),
        }
    }
}

/// Where the crop lives inside the packet text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    /// Start tag of the target `rdf:Description`, `<` through `>`.
    tag: Range<usize>,
    /// Prefix bound to [`CRS_NAMESPACE`] in scope at the target, if any.
    prefix: Option<String>,
    /// Crop fields stored as child elements: whole element, start to end tag.
    elements: Vec<(CropField, Range<usize>)>,
}

/// An XMP sidecar packet, held verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarDocument {
    text: String,
    layout: Layout,
    from_template: bool,
}

impl SidecarDocument {
    /// The packet used when an image has no sidecar yet.
    pub fn template() -> Self {
        let layout = scan(TEMPLATE).expect("built-in template must parse");
        Self {
            text: TEMPLATE.to_string(),
            layout,
            from_template: true,
        }
    }

    /// Parse a packet. Fails on malformed XML or when there is no
    /// `rdf:Description` to hold the crop.
    pub fn parse(text: impl Into<String>) -> Result<Self, MalformedXmp> {
        let text = text.into();
        let layout = scan(&text)?;
        Ok(Self {
            text,
            layout,
            from_template: false,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Whether this document came from [`SidecarDocument::template`] rather
    /// than from a file.
    pub fn is_template(&self) -> bool {
        self.from_template
    }

    /// The crop currently stored, if `HasCrop` is `True` and the values form
    /// a valid region. Missing edges default to the frame edge.
    pub fn crop(&self) -> Option<CropRegion> {
        let value = |field: CropField| self.field_value(field);
        if !value(CropField::HasCrop)?.trim().eq_ignore_ascii_case("true") {
            return None;
        }
        let edge = |field: CropField, default: f64| -> Option<f64> {
            match value(field) {
                Some(v) => v.trim().parse().ok(),
                None => Some(default),
            }
        };
        CropRegion::new(
            edge(CropField::Left, 0.0)?,
            edge(CropField::Top, 0.0)?,
            edge(CropField::Right, 1.0)?,
            edge(CropField::Bottom, 1.0)?,
        )
        .ok()
    }

    /// A copy of this document with `crop` written into the target
    /// description. Only the crop fields (and, when absent, the `crs`
    /// namespace declaration) change.
    pub fn merge(&self, crop: &CropRegion) -> SidecarDocument {
        let tag_text = &self.text[self.layout.tag.clone()];
        let attrs = attribute_spans(tag_text);
        let separator = attribute_separator(tag_text, &attrs);
        let prefix = self
            .layout
            .prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_CRS_PREFIX.to_string());

        let mut edits: Vec<Edit> = Vec::new();
        let mut appended = String::new();
        if self.layout.prefix.is_none() {
            appended.push_str(&format!("{separator}xmlns:{prefix}=\"{CRS_NAMESPACE}\""));
        }

        for field in CropField::ALL {
            let qname = format!("{prefix}:{}", field.local_name());
            let value = field.value_for(crop);

            if let Some(attr) = attrs.iter().find(|a| &tag_text[a.name.clone()] == qname) {
                edits.push(Edit::new(offset(&attr.value, self.layout.tag.start), value));
            } else if let Some((_, span)) = self.layout.elements.iter().find(|(f, _)| *f == field) {
                edits.push(Edit::new(span.clone(), format!("<{qname}>{value}</{qname}>")));
            } else {
                appended.push_str(&format!("{separator}{qname}=\"{value}\""));
            }
        }

        if !appended.is_empty() {
            let at = self.layout.tag.start + insertion_point(tag_text, &attrs);
            edits.push(Edit::new(at..at, appended));
        }
        edits.sort_by_key(|e| e.range.start);

        let text = apply_edits(&self.text, &edits);
        let shift = |pos: usize| shifted(pos, &edits);
        let layout = Layout {
            tag: self.layout.tag.start..shift(self.layout.tag.end),
            prefix: Some(prefix),
            elements: self
                .layout
                .elements
                .iter()
                .map(|(field, span)| {
                    let start = shift(span.start);
                    let len = edits
                        .iter()
                        .find(|e| e.range == *span)
                        .map_or(span.len(), |e| e.replacement.len());
                    (*field, start..start + len)
                })
                .collect(),
        };

        SidecarDocument {
            text,
            layout,
            from_template: self.from_template,
        }
    }

    fn field_value(&self, field: CropField) -> Option<String> {
        let prefix = self.layout.prefix.as_deref()?;
        let qname = format!("{prefix}:{}", field.local_name());

        let tag_text = &self.text[self.layout.tag.clone()];
        let mut reader = Reader::from_str(tag_text);
        if let Ok(Event::Start(tag) | Event::Empty(tag)) = reader.read_event() {
            for attr in tag.attributes().flatten() {
                if attr.key.as_ref() == qname.as_bytes() {
                    return attr.unescape_value().ok().map(|v| v.into_owned());
                }
            }
        }

        let (_, span) = self.layout.elements.iter().find(|(f, _)| *f == field)?;
        let element = &self.text[span.clone()];
        let open_end = element.find('>')?;
        let close_start = element.rfind("</")?;
        (open_end < close_start).then(|| element[open_end + 1..close_start].to_string())
    }
}

// =============================================================================
// Scanning
// =============================================================================

/// A description start tag seen while scanning.
struct DescriptionCandidate {
    tag: Range<usize>,
    prefix: Option<String>,
    has_crs: bool,
    elements: Vec<(CropField, Range<usize>)>,
}

/// Offset of the `<` opening the tag that the reader consumed between
/// `before` and `end`. The reader may already be one byte past that `<`
/// when `before` is taken, and a raw `<` inside an attribute value must not
/// be mistaken for it, so the search runs forward from `before - 1`.
fn tag_start(text: &str, before: usize, end: usize) -> Option<usize> {
    let from = before.saturating_sub(1);
    text.as_bytes()
        .get(from..end)?
        .iter()
        .position(|&b| b == b'<')
        .map(|i| from + i)
}

/// An open element-form crop field awaiting its end tag.
struct OpenField {
    candidate: usize,
    field: CropField,
    start: usize,
    depth: usize,
}

/// Walk the packet once, checking well-formedness and locating the target
/// description and any element-form crop fields.
fn scan(text: &str) -> Result<Layout, MalformedXmp> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    // (depth of declaring element, prefix) for every in-scope crs binding
    let mut crs_bindings: Vec<(usize, String)> = Vec::new();
    // (depth, candidate index) for every open description
    let mut open_descriptions: Vec<(usize, usize)> = Vec::new();
    let mut open_field: Option<OpenField> = None;
    let mut candidates: Vec<DescriptionCandidate> = Vec::new();

    loop {
        let before = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| MalformedXmp::new(e.to_string(), reader.buffer_position()))?;
        let end = reader.buffer_position();

        match event {
            Event::Eof => break,
            Event::Start(ref tag) | Event::Empty(ref tag) => {
                let self_closing = matches!(event, Event::Empty(_));
                let level = depth + 1;
                let start = tag_start(text, before, end)
                    .ok_or_else(|| MalformedXmp::new("tag without '<'", end))?;

                let attrs = read_attributes(tag, end)?;
                for (key, value) in &attrs {
                    if let Some(prefix) = key.strip_prefix("xmlns:")
                        && value == CRS_NAMESPACE
                    {
                        crs_bindings.push((level, prefix.to_string()));
                    }
                }
                let prefix = crs_bindings.last().map(|(_, p)| p.clone());
                let name = tag.name();

                if name.local_name().as_ref() == b"Description" {
                    let has_crs = prefix.as_ref().is_some_and(|p| {
                        attrs
                            .iter()
                            .any(|(k, _)| k.split_once(':').is_some_and(|(kp, _)| kp == p))
                    });
                    candidates.push(DescriptionCandidate {
                        tag: start..end,
                        prefix: prefix.clone(),
                        has_crs,
                        elements: Vec::new(),
                    });
                    if !self_closing {
                        open_descriptions.push((level, candidates.len() - 1));
                    }
                } else if let (Some(&(desc_depth, candidate)), Some(p)) =
                    (open_descriptions.last(), prefix.as_ref())
                {
                    let field = name
                        .prefix()
                        .filter(|np| np.as_ref() == p.as_bytes())
                        .and_then(|_| CropField::from_local_name(name.local_name().as_ref()));
                    if let Some(field) = field
                        && level == desc_depth + 1
                        && open_field.is_none()
                    {
                        candidates[candidate].has_crs = true;
                        if self_closing {
                            candidates[candidate].elements.push((field, start..end));
                        } else {
                            open_field = Some(OpenField {
                                candidate,
                                field,
                                start,
                                depth: level,
                            });
                        }
                    }
                }

                if self_closing {
                    crs_bindings.retain(|(d, _)| *d < level);
                } else {
                    depth = level;
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Err(MalformedXmp::new("closing tag without opening tag", end));
                }
                if let Some(open) = open_field.take_if(|f| f.depth == depth) {
                    candidates[open.candidate]
                        .elements
                        .push((open.field, open.start..end));
                }
                if open_descriptions.last().is_some_and(|(d, _)| *d == depth) {
                    open_descriptions.pop();
                }
                crs_bindings.retain(|(d, _)| *d < depth);
                depth -= 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(MalformedXmp::new(
            format!("{depth} element(s) left unclosed"),
            text.len(),
        ));
    }

    let index = candidates
        .iter()
        .position(|c| c.has_crs)
        .or_else(|| (!candidates.is_empty()).then_some(0))
        .ok_or_else(|| MalformedXmp::new("no rdf:Description element", text.len()))?;
    let target = candidates.swap_remove(index);

    Ok(Layout {
        tag: target.tag,
        prefix: target.prefix,
        elements: target.elements,
    })
}

/// Decoded `(key, raw value)` pairs of a start tag. Duplicate or malformed
/// attributes are errors.
fn read_attributes(tag: &BytesStart<'_>, position: usize) -> Result<Vec<(String, String)>, MalformedXmp> {
    tag.attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| MalformedXmp::new(e.to_string(), position))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            Ok((key, value))
        })
        .collect()
}

// =============================================================================
// Splicing
// =============================================================================

/// Byte spans of one attribute within a start tag. `value` excludes quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSpan {
    name: Range<usize>,
    value: Range<usize>,
}

impl AttrSpan {
    /// Offset just past the closing quote.
    fn end(&self) -> usize {
        self.value.end + 1
    }
}

/// Locate attributes in a start tag that has already been checked by the
/// parser.
fn attribute_spans(tag: &str) -> Vec<AttrSpan> {
    let bytes = tag.as_bytes();
    let len = bytes.len();
    let is_space = |b: u8| b.is_ascii_whitespace();
    let mut spans = Vec::new();

    // element name
    let mut i = 1;
    while i < len && !is_space(bytes[i]) && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }

    loop {
        while i < len && is_space(bytes[i]) {
            i += 1;
        }
        if i >= len || bytes[i] == b'>' || bytes[i] == b'/' {
            break;
        }
        let name_start = i;
        while i < len && !is_space(bytes[i]) && !matches!(bytes[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        let name_end = i;
        while i < len && is_space(bytes[i]) {
            i += 1;
        }
        if i >= len || bytes[i] != b'=' {
            break;
        }
        i += 1;
        while i < len && is_space(bytes[i]) {
            i += 1;
        }
        if i >= len || !matches!(bytes[i], b'"' | b'\'') {
            break;
        }
        let quote = bytes[i];
        i += 1;
        let value_start = i;
        while i < len && bytes[i] != quote {
            i += 1;
        }
        spans.push(AttrSpan {
            name: name_start..name_end,
            value: value_start..i,
        });
        i += 1;
    }

    spans
}

/// Whitespace that precedes the last attribute, reused for new ones so they
/// line up with the existing layout.
fn attribute_separator(tag: &str, attrs: &[AttrSpan]) -> String {
    let Some(last) = attrs.last() else {
        return " ".to_string();
    };
    let before = &tag[..last.name.start];
    let trimmed = before.trim_end();
    let separator = &before[trimmed.len()..];
    if separator.is_empty() {
        " ".to_string()
    } else {
        separator.to_string()
    }
}

/// Where new attributes go: right after the last attribute, or after the
/// element name when there are none.
fn insertion_point(tag: &str, attrs: &[AttrSpan]) -> usize {
    match attrs.last() {
        Some(last) => last.end(),
        None => tag[1..]
            .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
            .map_or(tag.len(), |i| i + 1),
    }
}

#[derive(Debug, Clone)]
struct Edit {
    range: Range<usize>,
    replacement: String,
}

impl Edit {
    fn new(range: Range<usize>, replacement: String) -> Self {
        Self { range, replacement }
    }
}

fn offset(range: &Range<usize>, by: usize) -> Range<usize> {
    range.start + by..range.end + by
}

/// Apply non-overlapping edits sorted by start.
fn apply_edits(text: &str, edits: &[Edit]) -> String {
    let grown: usize = edits.iter().map(|e| e.replacement.len()).sum();
    let mut out = String::with_capacity(text.len() + grown);
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&text[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Position `pos` after applying every edit that ends at or before it.
fn shifted(pos: usize, edits: &[Edit]) -> usize {
    let mut result = pos as isize;
    for edit in edits.iter().filter(|e| e.range.end <= pos) {
        result += edit.replacement.len() as isize - edit.range.len() as isize;
    }
    result as usize
}
