//! OPC (Open Packaging Conventions) handling for 3MF files
//!
//! 3MF files are ZIP archives following the OPC standard. The root
//! relationships part names the 3D model part that holds the mesh data.

use crate::error::ThreeMfError;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Read, Seek};
use urlencoding::decode;
use zip::ZipArchive;

/// Conventional model part path, used when the relationships do not name one
pub const MODEL_PATH: &str = "3D/3dmodel.model";

/// Relationships file path
pub const RELS_PATH: &str = "_rels/.rels";

/// 3D model relationship type
pub const MODEL_REL_TYPE: &str = "http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel";

type Result<T> = std::result::Result<T, ThreeMfError>;

/// An opened 3MF package
pub struct Package<R: Read> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> Package<R> {
    /// Open a 3MF package from a reader
    pub fn open(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader)?;
        Ok(Self { archive })
    }

    /// Get the main 3D model part as text
    pub fn get_model(&mut self) -> Result<String> {
        let model_path = match self.discover_model_path()? {
            Some(path) => path,
            None if self.has_file(MODEL_PATH) => MODEL_PATH.to_string(),
            None => {
                return Err(ThreeMfError::MissingFile(
                    "3D model relationship not found".to_string(),
                ));
            }
        };
        self.get_file(&model_path)
    }

    /// Find the model part named by the root relationships
    fn discover_model_path(&mut self) -> Result<Option<String>> {
        if !self.has_file(RELS_PATH) {
            return Ok(None);
        }
        let rels_content = self.get_file(RELS_PATH)?;

        let mut reader = Reader::from_str(&rels_content);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(ref e) | Event::Start(ref e) => {
                    let name = e.name();
                    let name_str = std::str::from_utf8(name.as_ref())
                        .map_err(|e| ThreeMfError::InvalidXml(e.to_string()))?;

                    if name_str.ends_with("Relationship") {
                        let mut target = None;
                        let mut rel_type = None;

                        for attr in e.attributes() {
                            let attr = attr?;
                            let value = std::str::from_utf8(&attr.value)
                                .map_err(|e| ThreeMfError::InvalidXml(e.to_string()))?;
                            match attr.key.as_ref() {
                                b"Target" => target = Some(value.to_string()),
                                b"Type" => rel_type = Some(value.to_string()),
                                _ => {}
                            }
                        }

                        if let (Some(t), Some(MODEL_REL_TYPE)) = (target, rel_type.as_deref()) {
                            return Ok(Some(part_name(&t)));
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(None)
    }

    /// Get a file by name from the archive
    pub fn get_file(&mut self, name: &str) -> Result<String> {
        let mut file = self
            .archive
            .by_name(name)
            .map_err(|_| ThreeMfError::MissingFile(name.to_string()))?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }

    /// Check if a file exists in the archive
    pub fn has_file(&mut self, name: &str) -> bool {
        self.archive.by_name(name).is_ok()
    }
}

/// Relationship target to ZIP entry name: no leading slash, percent-decoded
fn part_name(target: &str) -> String {
    let trimmed = target.strip_prefix('/').unwrap_or(target);
    match decode(trimmed) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => trimmed.to_string(),
    }
}
