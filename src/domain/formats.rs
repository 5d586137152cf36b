//! Static format registry: accepted document formats, their compatibility
//! pairs, and the engine assigned to each pair.
//!
//! The table is enumerated explicitly and lookups fail closed: a pair that is
//! not listed is not convertible, regardless of what either engine could in
//! principle produce.

use serde::{Deserialize, Serialize};

/// Document formats the service understands.
///
/// Every variant is a valid input; only a subset is offered as a conversion
/// target (see [`OUTPUT_FORMATS`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Doc,
    Docx,
    Xls,
    Xlsx,
    Ppt,
    Pptx,
    Odt,
    Rtf,
    Txt,
}

/// External conversion capability addressed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    /// Office-suite renderer: office formats between themselves and to PDF.
    Office,
    /// PDF layout extractor: PDF to editable Word documents.
    PdfLayout,
}

impl EngineId {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineId::Office => "office",
            EngineId::PdfLayout => "pdf_layout",
        }
    }
}

/// Broad content family recognised by magic-byte sniffing.
///
/// Sniffing cannot always pin the exact format (all OOXML and ODF documents
/// are zip containers, all legacy office formats share the OLE2 header), so
/// the guard checks that the declared format belongs to the sniffed family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFamily {
    Pdf,
    /// Zip container: DOCX, XLSX, PPTX, ODT.
    ZipPackage,
    /// OLE2 compound file: DOC, XLS, PPT.
    Ole2,
    Rtf,
    /// No binary signature and no NUL bytes in the probe window.
    PlainText,
}

pub const INPUT_FORMATS: &[DocumentFormat] = &[
    DocumentFormat::Pdf,
    DocumentFormat::Doc,
    DocumentFormat::Docx,
    DocumentFormat::Xls,
    DocumentFormat::Xlsx,
    DocumentFormat::Ppt,
    DocumentFormat::Pptx,
    DocumentFormat::Odt,
    DocumentFormat::Rtf,
    DocumentFormat::Txt,
];

pub const OUTPUT_FORMATS: &[DocumentFormat] = &[
    DocumentFormat::Pdf,
    DocumentFormat::Docx,
    DocumentFormat::Odt,
    DocumentFormat::Rtf,
];

/// Word-processing inputs that convert between the editable text formats.
const TEXT_DOCUMENT_SOURCES: &[DocumentFormat] = &[
    DocumentFormat::Doc,
    DocumentFormat::Docx,
    DocumentFormat::Odt,
    DocumentFormat::Rtf,
    DocumentFormat::Txt,
];

impl DocumentFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Doc => "doc",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Xls => "xls",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Ppt => "ppt",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Odt => "odt",
            DocumentFormat::Rtf => "rtf",
            DocumentFormat::Txt => "txt",
        }
    }

    /// Canonical file extension, identical to the wire name.
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        INPUT_FORMATS
            .iter()
            .copied()
            .find(|format| format.as_str() == normalized)
    }

    /// MIME type used when serving converted artifacts.
    pub fn mime(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Doc => "application/msword",
            DocumentFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentFormat::Xls => "application/vnd.ms-excel",
            DocumentFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            DocumentFormat::Ppt => "application/vnd.ms-powerpoint",
            DocumentFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            DocumentFormat::Odt => "application/vnd.oasis.opendocument.text",
            DocumentFormat::Rtf => "application/rtf",
            DocumentFormat::Txt => "text/plain",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        match essence {
            "text/rtf" => return Some(DocumentFormat::Rtf),
            "application/vnd.oasis.opendocument.text-template" => {
                return Some(DocumentFormat::Odt);
            }
            _ => {}
        }
        INPUT_FORMATS
            .iter()
            .copied()
            .find(|format| format.mime() == essence)
    }

    /// The content family this format is expected to sniff as.
    pub fn family(self) -> ContentFamily {
        match self {
            DocumentFormat::Pdf => ContentFamily::Pdf,
            DocumentFormat::Docx
            | DocumentFormat::Xlsx
            | DocumentFormat::Pptx
            | DocumentFormat::Odt => ContentFamily::ZipPackage,
            DocumentFormat::Doc | DocumentFormat::Xls | DocumentFormat::Ppt => ContentFamily::Ole2,
            DocumentFormat::Rtf => ContentFamily::Rtf,
            DocumentFormat::Txt => ContentFamily::PlainText,
        }
    }
}

/// Formats the given source may be converted into.
pub fn supported_targets(source: DocumentFormat) -> Vec<DocumentFormat> {
    OUTPUT_FORMATS
        .iter()
        .copied()
        .filter(|target| engine_for(source, *target).is_some())
        .collect()
}

/// Resolve the engine owning a conversion pair.
///
/// Priority is fixed: the PDF layout extractor owns PDF→DOCX, the office
/// renderer owns every other enumerated pair. Identity pairs and anything
/// not listed resolve to `None`.
pub fn engine_for(source: DocumentFormat, target: DocumentFormat) -> Option<EngineId> {
    if source == target {
        return None;
    }

    match (source, target) {
        (DocumentFormat::Pdf, DocumentFormat::Docx) => Some(EngineId::PdfLayout),
        (DocumentFormat::Pdf, _) => None,
        // Spreadsheets and presentations render to PDF only.
        (
            DocumentFormat::Xls | DocumentFormat::Xlsx | DocumentFormat::Ppt | DocumentFormat::Pptx,
            DocumentFormat::Pdf,
        ) => Some(EngineId::Office),
        (
            DocumentFormat::Xls | DocumentFormat::Xlsx | DocumentFormat::Ppt | DocumentFormat::Pptx,
            _,
        ) => None,
        (source, DocumentFormat::Pdf) if TEXT_DOCUMENT_SOURCES.contains(&source) => {
            Some(EngineId::Office)
        }
        (source, target)
            if TEXT_DOCUMENT_SOURCES.contains(&source) && OUTPUT_FORMATS.contains(&target) =>
        {
            Some(EngineId::Office)
        }
        _ => None,
    }
}

const PROBE_WINDOW: usize = 512;

/// Sniff the broad content family from leading magic bytes.
///
/// Returns `None` when the payload matches no known signature and contains
/// NUL bytes, i.e. it is some unrecognised binary.
pub fn sniff_family(payload: &[u8]) -> Option<ContentFamily> {
    if payload.starts_with(b"%PDF-") {
        return Some(ContentFamily::Pdf);
    }
    if payload.starts_with(b"PK\x03\x04") {
        return Some(ContentFamily::ZipPackage);
    }
    if payload.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        return Some(ContentFamily::Ole2);
    }
    if payload.starts_with(b"{\\rtf") {
        return Some(ContentFamily::Rtf);
    }

    let window = &payload[..payload.len().min(PROBE_WINDOW)];
    if !window.is_empty() && !window.contains(&0) {
        return Some(ContentFamily::PlainText);
    }

    None
}
