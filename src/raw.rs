//! The raw backend: a hand-serialized PDF written one page at a time.
//!
//! Only one decoded image is held in memory at once. Every page carries a
//! fixed-width `/Rotate` field, so rotation is a same-length byte patch
//! that leaves the cross-reference offsets valid.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::OnceLock;

use regex::bytes::Regex;

use crate::backend::{load_rgb, write_file};
use crate::config::{PageSize, Rotation};
use crate::staging::StagedImage;

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const OBJECTS_PER_PAGE: usize = 3;

fn rotate_field() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/Rotate (?P<angle>  [0-9]| [0-9]{2}|[0-9]{3})\b").expect("valid regex"))
}

fn page_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/Type\s*/Page\b").expect("valid regex"))
}

fn stream_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/Length (?P<length>[0-9]+) >>\nstream\n").expect("valid regex"))
}

/// Counts bytes so object offsets are known as they are written.
struct CountingWriter<W> {
    inner: W,
    written: usize,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RawWriter<W> {
    out: CountingWriter<W>,
    offsets: Vec<usize>,
}

impl<W: Write> RawWriter<W> {
    fn new(inner: W, object_count: usize) -> io::Result<Self> {
        let mut out = CountingWriter { inner, written: 0 };
        out.write_all(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n")?;
        Ok(Self {
            out,
            offsets: vec![0; object_count],
        })
    }

    fn begin(&mut self, id: usize) -> io::Result<()> {
        self.offsets[id - 1] = self.out.written;
        writeln!(self.out, "{} 0 obj", id)
    }

    fn object(&mut self, id: usize, body: &str) -> io::Result<()> {
        self.begin(id)?;
        writeln!(self.out, "{}\nendobj", body)
    }

    fn stream(&mut self, id: usize, dict: &str, data: &[u8]) -> io::Result<()> {
        self.begin(id)?;
        write!(self.out, "<< {} /Length {} >>\nstream\n", dict, data.len())?;
        self.out.write_all(data)?;
        self.out.write_all(b"\nendstream\nendobj\n")
    }

    fn finish(mut self) -> io::Result<W> {
        let xref = self.out.written;
        write!(self.out, "xref\n0 {}\n", self.offsets.len() + 1)?;
        self.out.write_all(b"0000000000 65535 f \n")?;
        for offset in &self.offsets {
            writeln!(self.out, "{:010} 00000 n ", offset)?;
        }
        write!(
            self.out,
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.offsets.len() + 1,
            CATALOG_ID,
            xref
        )?;
        self.out.flush()?;
        Ok(self.out.inner)
    }
}

/// Stream a document to `destination`, one page at a time.
pub fn create_raw(
    images: &[StagedImage],
    page_size: PageSize,
    destination: &Path,
) -> Result<usize, String> {
    let file = File::create(destination)
        .map_err(|e| format!("unable to write {}: {}", destination.display(), e))?;

    write_document(BufWriter::new(file), images, page_size)
        .map_err(|e| format!("unable to write {}: {}", destination.display(), e))?;

    Ok(images.len())
}

fn page_id(index: usize) -> usize {
    PAGES_ID + 1 + index * OBJECTS_PER_PAGE
}

fn write_document<W: Write>(out: W, images: &[StagedImage], page_size: PageSize) -> io::Result<W> {
    let mut pdf = RawWriter::new(out, PAGES_ID + images.len() * OBJECTS_PER_PAGE)?;
    let PageSize { width, height } = page_size;

    pdf.object(
        CATALOG_ID,
        &format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES_ID),
    )?;

    let kids: Vec<String> = (0..images.len())
        .map(|i| format!("{} 0 R", page_id(i)))
        .collect();
    pdf.object(
        PAGES_ID,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            images.len()
        ),
    )?;

    for (index, staged) in images.iter().enumerate() {
        let rgb = load_rgb(staged).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let page = page_id(index);
        let (content, image) = (page + 1, page + 2);

        pdf.object(
            page,
            &format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Rotate {:>3} \
                 /Resources << /XObject << /Im0 {} 0 R >> >> /Contents {} 0 R >>",
                PAGES_ID, width, height, 0, image, content
            ),
        )?;

        let ops = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", width, height);
        pdf.stream(content, "", ops.as_bytes())?;

        pdf.stream(
            image,
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceRGB /BitsPerComponent 8",
                rgb.width(),
                rgb.height()
            ),
            rgb.as_raw(),
        )?;
    }

    pdf.finish()
}

/// Rotate every page by patching its fixed-width `/Rotate` field in place.
///
/// Documents not written by [`create_raw`] lack those fields and are rejected.
pub fn rotate_raw(source: &Path, rotation: Rotation, destination: &Path) -> Result<usize, String> {
    let buf = std::fs::read(source).map_err(|e| format!("unable to read {}: {}", source.display(), e))?;
    let (patched, pages) = patch_rotation(&buf, rotation)?;
    write_file(destination, &patched)?;
    Ok(pages)
}

// Only dictionary text is scanned; stream data is skipped by its `/Length`.
// Every page must carry a patchable field, or nothing is rotated.
fn patch_rotation(buf: &[u8], rotation: Rotation) -> Result<(Vec<u8>, usize), String> {
    let mut patched = buf.to_vec();
    let (mut pages, mut fields) = (0, 0);
    let mut pos = 0;

    while pos < buf.len() {
        let (text_end, next) = match stream_header().captures_at(buf, pos) {
            Some(caps) => {
                let (Some(header), Some(length)) = (caps.get(0), caps.name("length")) else {
                    break;
                };
                let length = std::str::from_utf8(length.as_bytes())
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| "unsupported input: unreadable stream length".to_string())?;
                (header.start(), header.end().saturating_add(length))
            }
            None => (buf.len(), buf.len()),
        };

        if next > buf.len() {
            return Err("unsupported input: stream runs past the end of the file".to_string());
        }

        let text = &buf[pos..text_end];
        pages += page_marker().find_iter(text).count();
        for caps in rotate_field().captures_iter(text) {
            let (Some(whole), Some(angle)) = (caps.get(0), caps.name("angle")) else {
                continue;
            };
            // The pattern only admits ASCII digits and padding.
            let angle = std::str::from_utf8(angle.as_bytes())
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0);
            let field = format!("/Rotate {:>3}", rotation.apply(angle));
            patched[pos + whole.start()..pos + whole.end()].copy_from_slice(field.as_bytes());
            fields += 1;
        }

        pos = next;
    }

    if fields == 0 || fields != pages {
        return Err(format!(
            "unsupported input: {} of {} pages carry a fixed-width rotation field",
            fields, pages
        ));
    }

    debug_assert_eq!(patched.len(), buf.len());
    Ok((patched, pages))
}
