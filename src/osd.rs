//! Count overlays handed to the on-screen display

use crate::config::OverlayConfig;
use crate::utils::meta::{FontDescriptor, OverlayRecord, Rgba};

/// Fixed look of the count label
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub x_offset: u32,
    pub y_offset: u32,
    pub font_name: String,
    pub font_size: u32,
    pub font_color: Rgba,
    pub background: Option<Rgba>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for OverlayStyle {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            x_offset: config.x_offset,
            y_offset: config.y_offset,
            font_name: config.font_name.clone(),
            font_size: config.font_size,
            font_color: Rgba::WHITE,
            background: Some(Rgba::BLACK),
        }
    }
}

/// Label text for a class count. The trailing space is part of the format.
pub fn count_text(label: &str, count: usize) -> String {
    format!("{} = {} ", label, count)
}

/// Builds one count overlay per frame
#[derive(Debug, Clone)]
pub struct OverlayBuilder {
    label: String,
    style: OverlayStyle,
}

impl OverlayBuilder {
    pub fn new(label: impl Into<String>, style: OverlayStyle) -> Self {
        Self {
            label: label.into(),
            style,
        }
    }

    pub fn build(&self, count: usize) -> OverlayRecord {
        OverlayRecord {
            text: count_text(&self.label, count),
            x_offset: self.style.x_offset,
            y_offset: self.style.y_offset,
            font: FontDescriptor {
                name: self.style.font_name.clone(),
                size: self.style.font_size,
                color: self.style.font_color,
            },
            background: self.style.background,
        }
    }
}

impl Default for OverlayBuilder {
    fn default() -> Self {
        Self::new("Person", OverlayStyle::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_text_keeps_trailing_space() {
        assert_eq!(count_text("Person", 0), "Person = 0 ");
        assert_eq!(count_text("Person", 12), "Person = 12 ");
    }

    #[test]
    fn test_default_record() {
        let record = OverlayBuilder::default().build(3);
        assert_eq!(record.text, "Person = 3 ");
        assert_eq!((record.x_offset, record.y_offset), (10, 12));
        assert_eq!(record.font.name, "Serif");
        assert_eq!(record.font.size, 10);
        assert_eq!(record.font.color, Rgba::WHITE);
        assert_eq!(record.background, Some(Rgba::BLACK));
    }

    #[test]
    fn test_style_from_config() {
        let config = OverlayConfig {
            font_name: "Sans".to_string(),
            font_size: 14,
            x_offset: 4,
            ..OverlayConfig::default()
        };
        let record = OverlayBuilder::new("Face", OverlayStyle::from(&config)).build(1);
        assert_eq!(record.text, "Face = 1 ");
        assert_eq!(record.font.name, "Sans");
        assert_eq!(record.x_offset, 4);
    }
}
