use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes read from the head of a file for content sniffing.
pub const SNIFF_BUFFER_SIZE: usize = 8192;

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "rtf", "odt", "ods", "odp",
];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "bz2", "rar", "7z", "xz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Video => "video",
            Category::Audio => "audio",
            Category::Document => "document",
            Category::Archive => "archive",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub category: Category,
    /// False when sniffing found nothing or found a type with no category;
    /// such files land in `other` and count as unknown.
    pub recognized: bool,
}

/// Map a sniffed MIME type and extension to a category.
pub fn categorize(mime: &str, extension: &str) -> Option<Category> {
    match mime.split('/').next() {
        Some("image") => return Some(Category::Image),
        Some("video") => return Some(Category::Video),
        Some("audio") => return Some(Category::Audio),
        _ => {}
    }
    if DOCUMENT_EXTENSIONS.contains(&extension) {
        Some(Category::Document)
    } else if ARCHIVE_EXTENSIONS.contains(&extension) {
        Some(Category::Archive)
    } else {
        None
    }
}

pub fn detect_bytes(head: &[u8]) -> Detection {
    match infer::get(head).and_then(|kind| categorize(kind.mime_type(), kind.extension())) {
        Some(category) => Detection {
            category,
            recognized: true,
        },
        None => Detection {
            category: Category::Other,
            recognized: false,
        },
    }
}

pub fn detect(path: &Path) -> io::Result<Detection> {
    let mut head = Vec::with_capacity(SNIFF_BUFFER_SIZE);
    File::open(path)?
        .take(SNIFF_BUFFER_SIZE as u64)
        .read_to_end(&mut head)?;
    Ok(detect_bytes(&head))
}
