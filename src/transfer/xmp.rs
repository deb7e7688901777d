//! GPS patching of the XMP packets Lightroom caches per image.
//!
//! The packet is edited in place rather than re-serialized: only the start
//! tag of the first `rdf:Description` is rewritten and GPS child elements of
//! it are cut out. Every other byte is copied from the input.

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, TransferError};

pub const EXIF_NAMESPACE: &str = "http://ns.adobe.com/exif/1.0/";

const EXIF_PREFIX: &str = "exif";

/// GPS properties written for every located image.
const GPS_WRITTEN: [&str; 5] = [
    "GPSVersionID",
    "GPSLatitude",
    "GPSLongitude",
    "GPSLatitudeRef",
    "GPSLongitudeRef",
];

/// GPS properties that no longer describe the new position.
const GPS_STALE: [&str; 27] = [
    "GPSAltitude",
    "GPSAltitudeRef",
    "GPSAreaInformation",
    "GPSDOP",
    "GPSDateStamp",
    "GPSDestBearing",
    "GPSDestBearingRef",
    "GPSDestDistance",
    "GPSDestDistanceRef",
    "GPSDestLatitude",
    "GPSDestLatitudeRef",
    "GPSDestLongitude",
    "GPSDestLongitudeRef",
    "GPSDifferential",
    "GPSHPositioningError",
    "GPSImgDirection",
    "GPSImgDirectionRef",
    "GPSMapDatum",
    "GPSMeasureMode",
    "GPSProcessingMethod",
    "GPSSatellites",
    "GPSSpeed",
    "GPSSpeedRef",
    "GPSStatus",
    "GPSTimeStamp",
    "GPSTrack",
    "GPSTrackRef",
];

fn malformed(message: &str) -> TransferError {
    TransferError::MalformedXmp(message.to_string())
}

/// `<degrees>,<minutes with 10 decimals><hemisphere>` of the absolute value.
pub fn format_coordinate(value: f64, positive: char, negative: char) -> String {
    let hemisphere = if value >= 0.0 { positive } else { negative };
    let value = value.abs();
    let degrees = value.trunc();
    format!("{},{:.10}{}", degrees as i64, (value - degrees) * 60.0, hemisphere)
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn decode_value(raw: &str) -> String {
    match unescape(raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// `xmlns` and `xmlns:<prefix>` attributes as `(prefix, uri)`, the default
/// namespace under the empty prefix.
fn declaration(name: &str, value: &str) -> Option<(String, String)> {
    if name == "xmlns" {
        Some((String::new(), decode_value(value)))
    } else {
        name.strip_prefix("xmlns:")
            .map(|prefix| (prefix.to_string(), decode_value(value)))
    }
}

fn element_name(e: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|_| malformed("element name is not UTF-8"))
}

fn element_declarations(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut declarations = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref());
        let value = String::from_utf8_lossy(&attr.value);
        if let Some(binding) = declaration(&key, &value) {
            declarations.push(binding);
        }
    }
    Ok(declarations)
}

/// Namespace declarations of the currently open elements.
#[derive(Debug, Default)]
struct NamespaceScopes {
    scopes: Vec<Vec<(String, String)>>,
}

impl NamespaceScopes {
    fn push(&mut self, declarations: Vec<(String, String)>) {
        self.scopes.push(declarations);
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Every prefix in scope with the binding that applies to it.
    fn bindings(&self) -> BTreeMap<&str, &str> {
        let mut bindings = BTreeMap::new();
        for (prefix, uri) in self.scopes.iter().flatten() {
            bindings.insert(prefix.as_str(), uri.as_str());
        }
        bindings
    }

    /// The local name of an attribute in the EXIF namespace. Unprefixed
    /// attributes have no namespace.
    fn exif_attribute<'n>(&self, name: &'n str) -> Option<&'n str> {
        match split_qname(name) {
            (Some(prefix), local) if prefix != "xmlns" && self.resolve(prefix) == Some(EXIF_NAMESPACE) => Some(local),
            _ => None,
        }
    }

    fn is_exif_element(&self, name: &str) -> bool {
        let (prefix, _) = split_qname(name);
        self.resolve(prefix.unwrap_or("")) == Some(EXIF_NAMESPACE)
    }
}

/// The prefix to write EXIF attributes with, and whether it still has to be
/// declared.
fn exif_prefix(scopes: &NamespaceScopes) -> (String, bool) {
    let bindings = scopes.bindings();
    if bindings.get(EXIF_PREFIX) == Some(&EXIF_NAMESPACE) {
        return (EXIF_PREFIX.to_string(), false);
    }
    if let Some((prefix, _)) = bindings
        .iter()
        .find(|(prefix, uri)| !prefix.is_empty() && **uri == EXIF_NAMESPACE)
    {
        return (prefix.to_string(), false);
    }
    if !bindings.contains_key(EXIF_PREFIX) {
        return (EXIF_PREFIX.to_string(), true);
    }
    let mut counter = 0u32;
    loop {
        let candidate = format!("{}{}", EXIF_PREFIX, counter);
        if !bindings.contains_key(candidate.as_str()) {
            return (candidate, true);
        }
        counter += 1;
    }
}

#[derive(Debug)]
struct RawAttribute<'a> {
    /// Whitespace between the previous token and the name.
    leading: &'a str,
    name: Cow<'a, str>,
    /// Everything between the name and the opening quote.
    assign: &'a str,
    quote: char,
    value: Cow<'a, str>,
}

/// A start tag split into tokens so it can be re-emitted with its original
/// spacing.
#[derive(Debug)]
struct StartTag<'a> {
    name: &'a str,
    attributes: Vec<RawAttribute<'a>>,
    trailing: &'a str,
    self_closing: bool,
}

impl<'a> StartTag<'a> {
    fn parse(tag: &'a str) -> Result<Self> {
        let inner = tag.strip_prefix('<').ok_or_else(|| malformed("start tag without `<`"))?;
        let (inner, self_closing) = match inner.strip_suffix("/>") {
            Some(inner) => (inner, true),
            None => (
                inner.strip_suffix('>').ok_or_else(|| malformed("unterminated start tag"))?,
                false,
            ),
        };

        let bytes = inner.as_bytes();
        let len = bytes.len();
        let mut pos = bytes
            .iter()
            .position(|b| b.is_ascii_whitespace())
            .unwrap_or(len);
        let name = &inner[..pos];
        let mut attributes = Vec::new();

        let trailing = loop {
            let leading_start = pos;
            while pos < len && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos == len {
                break &inner[leading_start..];
            }
            let leading = &inner[leading_start..pos];

            let name_start = pos;
            while pos < len && bytes[pos] != b'=' && !bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            let attr_name = &inner[name_start..pos];

            let assign_start = pos;
            while pos < len && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos == len || bytes[pos] != b'=' {
                return Err(malformed("attribute without value"));
            }
            pos += 1;
            while pos < len && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos == len || (bytes[pos] != b'"' && bytes[pos] != b'\'') {
                return Err(malformed("unquoted attribute value"));
            }
            let quote = bytes[pos];
            let assign = &inner[assign_start..pos];
            pos += 1;

            let value_start = pos;
            while pos < len && bytes[pos] != quote {
                pos += 1;
            }
            if pos == len {
                return Err(malformed("unterminated attribute value"));
            }
            let value = &inner[value_start..pos];
            pos += 1;

            attributes.push(RawAttribute {
                leading,
                name: Cow::Borrowed(attr_name),
                assign,
                quote: quote as char,
                value: Cow::Borrowed(value),
            });
        };

        Ok(Self {
            name,
            attributes,
            trailing,
            self_closing,
        })
    }

    fn declarations(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .filter_map(|attr| declaration(&attr.name, &attr.value))
            .collect()
    }

    /// Write the GPS properties and drop stale ones. `scopes` must include
    /// this tag's own declarations.
    fn apply_gps(&mut self, scopes: &NamespaceScopes, latitude: f64, longitude: f64) {
        let (prefix, declare) = exif_prefix(scopes);
        let latitude_ref = if latitude >= 0.0 { "N" } else { "S" };
        let longitude_ref = if longitude >= 0.0 { "E" } else { "W" };
        let values = [
            "2.0.0.0".to_string(),
            format_coordinate(latitude, 'N', 'S'),
            format_coordinate(longitude, 'E', 'W'),
            latitude_ref.to_string(),
            longitude_ref.to_string(),
        ];

        let mut written = [false; GPS_WRITTEN.len()];
        let mut kept = Vec::with_capacity(self.attributes.len() + GPS_WRITTEN.len() + 1);
        for mut attr in self.attributes.drain(..) {
            if let Some(local) = scopes.exif_attribute(&attr.name) {
                if GPS_STALE.contains(&local) {
                    continue;
                }
                if let Some(index) = GPS_WRITTEN.iter().position(|name| *name == local) {
                    if written[index] {
                        continue;
                    }
                    written[index] = true;
                    attr.value = Cow::Owned(escape(values[index].as_str()).into_owned());
                }
            }
            kept.push(attr);
        }

        let separator = kept.last().map(|attr| attr.leading).unwrap_or(" ");
        let appended = |name: String, value: &str| RawAttribute {
            leading: separator,
            name: Cow::Owned(name),
            assign: "=",
            quote: '"',
            value: Cow::Owned(escape(value).into_owned()),
        };

        let mut added = Vec::new();
        if declare {
            added.push(appended(format!("xmlns:{}", prefix), EXIF_NAMESPACE));
        }
        for (index, name) in GPS_WRITTEN.iter().enumerate() {
            if !written[index] {
                added.push(appended(format!("{}:{}", prefix, name), &values[index]));
            }
        }
        kept.extend(added);
        self.attributes = kept;
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push('<');
        out.push_str(self.name);
        for attr in &self.attributes {
            out.push_str(attr.leading);
            out.push_str(&attr.name);
            out.push_str(attr.assign);
            out.push(attr.quote);
            out.push_str(&attr.value);
            out.push(attr.quote);
        }
        out.push_str(self.trailing);
        out.push_str(if self.self_closing { "/>" } else { ">" });
        out
    }
}

/// Where to cut when removing the element starting at `start`: the
/// indentation and line break in front of it go too.
fn cut_start(xmp: &str, start: usize) -> usize {
    let bytes = xmp.as_bytes();
    let mut cut = start;
    while cut > 0 && (bytes[cut - 1] == b' ' || bytes[cut - 1] == b'\t') {
        cut -= 1;
    }
    if cut > 0 && bytes[cut - 1] == b'\n' {
        cut -= 1;
        if cut > 0 && bytes[cut - 1] == b'\r' {
            cut -= 1;
        }
    }
    cut
}

fn tag_start(xmp: &str, start: usize, end: usize) -> Result<usize> {
    xmp[start..end]
        .find('<')
        .map(|offset| start + offset)
        .ok_or_else(|| malformed("event without tag"))
}

fn is_gps_property(local: &str) -> bool {
    GPS_WRITTEN.contains(&local) || GPS_STALE.contains(&local)
}

/// Byte ranges of the GPS child elements of the Description whose start tag
/// was just read.
fn gps_child_elements(
    xmp: &str,
    reader: &mut Reader<&[u8]>,
    scopes: &mut NamespaceScopes,
) -> Result<Vec<(usize, usize)>> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut skipping: Option<usize> = None;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event()?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                let name = element_name(&e)?;
                scopes.push(element_declarations(&e)?);
                if depth == 0 && scopes.is_exif_element(&name) && is_gps_property(split_qname(&name).1) {
                    skipping = Some(cut_start(xmp, tag_start(xmp, start, end)?));
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    let name = element_name(&e)?;
                    scopes.push(element_declarations(&e)?);
                    let gps = scopes.is_exif_element(&name) && is_gps_property(split_qname(&name).1);
                    scopes.pop();
                    if gps {
                        spans.push((cut_start(xmp, tag_start(xmp, start, end)?), end));
                    }
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Ok(spans);
                }
                depth -= 1;
                scopes.pop();
                if depth == 0 {
                    if let Some(from) = skipping.take() {
                        spans.push((from, end));
                    }
                }
            }
            Event::Eof => return Err(malformed("unterminated rdf:Description")),
            _ => {}
        }
    }
}

fn rewrite_description(
    xmp: &str,
    reader: &mut Reader<&[u8]>,
    scopes: &mut NamespaceScopes,
    span: (usize, usize),
    latitude: f64,
    longitude: f64,
) -> Result<String> {
    let (start, end) = span;
    let start = tag_start(xmp, start, end)?;
    let mut tag = StartTag::parse(&xmp[start..end])?;

    scopes.push(tag.declarations());
    tag.apply_gps(scopes, latitude, longitude);
    let removed = if tag.self_closing {
        Vec::new()
    } else {
        gps_child_elements(xmp, reader, scopes)?
    };

    let mut out = String::with_capacity(xmp.len() + 256);
    out.push_str(&xmp[..start]);
    out.push_str(&tag.render());
    let mut cursor = end;
    for (from, to) in removed {
        out.push_str(&xmp[cursor..from]);
        cursor = to;
    }
    out.push_str(&xmp[cursor..]);
    Ok(out)
}

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Store a position in an XMP packet, replacing whatever GPS data it held.
pub fn patch_gps(xmp: &str, latitude: f64, longitude: f64) -> Result<String> {
    // The reader skips a leading byte order mark without counting it in its
    // positions, so spans are taken from the text after it.
    if let Some(body) = xmp.strip_prefix(BYTE_ORDER_MARK) {
        let mut patched = patch_gps(body, latitude, longitude)?;
        patched.insert(0, BYTE_ORDER_MARK);
        return Ok(patched);
    }

    let mut reader = Reader::from_str(xmp);
    let mut scopes = NamespaceScopes::default();
    let mut depth = 0usize;
    // Depth of the elements directly inside rdf:RDF, once it is open.
    let mut rdf_content: Option<usize> = None;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event()?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                let name = element_name(&e)?;
                let local = split_qname(&name).1;
                if rdf_content == Some(depth) && local == "Description" {
                    return rewrite_description(xmp, &mut reader, &mut scopes, (start, end), latitude, longitude);
                }
                if depth == 1 && rdf_content.is_none() && local == "RDF" {
                    rdf_content = Some(depth + 1);
                }
                scopes.push(element_declarations(&e)?);
                depth += 1;
            }
            Event::Empty(e) => {
                let name = element_name(&e)?;
                let local = split_qname(&name).1;
                if rdf_content == Some(depth) && local == "Description" {
                    return rewrite_description(xmp, &mut reader, &mut scopes, (start, end), latitude, longitude);
                }
                if depth == 0 {
                    return Err(malformed("empty root element"));
                }
                if depth == 1 && rdf_content.is_none() && local == "RDF" {
                    return Err(malformed("empty rdf:RDF"));
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                scopes.pop();
                if rdf_content == Some(depth + 1) {
                    return Err(malformed("rdf:RDF has no rdf:Description"));
                }
                if depth == 0 {
                    return Err(malformed("no rdf:RDF below the root element"));
                }
            }
            Event::Eof => return Err(malformed("no rdf:Description")),
            _ => {}
        }
    }
}
