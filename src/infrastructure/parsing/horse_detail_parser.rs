//! Horse detail page parser
//!
//! Field values are found by scanning every table cell for a label. Cells
//! nest, so an outer cell also contains its inner cells' text; cells are
//! visited in document order and the last (innermost) match wins.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::config::{HorseDetailSelectors, labels};
use super::{PageExtractor, ParsingError, ParsingResult};
use crate::domain::horse::Sex;
use crate::domain::pedigree::{PedigreeNode, PedigreeTree};
use crate::domain::services::{HorseInfo, LoadedPage};
use crate::domain::value_objects::extract_studbook_id;

static SEX_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(mare|stallion|gelding)\b").expect("sex pattern is a valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is a valid regex"));

/// Parser for the registry's horse detail page
pub struct HorseDetailParser {
    name: Selector,
    cell: Selector,
    pedigree_item: Selector,
    taproot_link: Selector,
    family_value: Selector,
    error_heading: Selector,
    server_error_marker: String,
}

/// A table cell's whitespace-normalized text plus its ASCII-lowercased twin.
/// ASCII lowercasing keeps byte offsets aligned between the two.
struct Cell<'a> {
    element: ElementRef<'a>,
    text: String,
    lower: String,
    /// Holds an ancestor link; its text is a horse name, not a field
    in_pedigree: bool,
}

fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(joined.trim(), " ").into_owned()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Cell text with the first occurrence of `label` removed, original case kept
fn strip_label(cell: &Cell<'_>, label: &str) -> Option<String> {
    let start = cell.lower.find(label)?;
    let end = start + label.len();
    let value = format!("{}{}", &cell.text[..start], &cell.text[end..]);
    non_empty(&value)
}

fn resolve_link(page_url: Option<&Url>, href: &str) -> String {
    page_url
        .and_then(|base| base.join(href).ok())
        .map_or_else(|| href.to_string(), |u| u.to_string())
}

impl HorseDetailParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_selectors(&HorseDetailSelectors::default())
    }

    pub fn with_selectors(selectors: &HorseDetailSelectors) -> ParsingResult<Self> {
        Ok(Self {
            name: Self::compile(&selectors.name)?,
            cell: Self::compile("td")?,
            pedigree_item: Self::compile(&selectors.pedigree_item)?,
            taproot_link: Self::compile(&selectors.taproot_link)?,
            family_value: Self::compile(&selectors.family_value)?,
            error_heading: Self::compile(&selectors.error_heading)?,
            server_error_marker: selectors.server_error_marker.clone(),
        })
    }

    fn compile(selector: &str) -> ParsingResult<Selector> {
        Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
    }

    fn cells<'a>(&self, document: &'a Html) -> Vec<Cell<'a>> {
        document
            .select(&self.cell)
            .map(|element| {
                let text = element_text(element);
                let lower = text.to_ascii_lowercase();
                let in_pedigree = element.select(&self.pedigree_item).next().is_some();
                Cell {
                    element,
                    text,
                    lower,
                    in_pedigree,
                }
            })
            .collect()
    }

    fn read_labelled_fields(cells: &[Cell<'_>], info: &mut HorseInfo) {
        for cell in cells.iter().filter(|cell| !cell.in_pedigree) {
            let targets: [(&str, &mut Option<String>); 5] = [
                (labels::LIFE_NUMBER, &mut info.life_number),
                (labels::DATE_OF_BIRTH, &mut info.date_of_birth),
                (labels::MICROCHIP_NUMBER, &mut info.microchip_number),
                (labels::DNA_TYPED, &mut info.dna_typed),
                (labels::AUST_ID, &mut info.aust_id),
            ];
            for (label, target) in targets {
                if let Some(value) = strip_label(cell, label) {
                    *target = Some(value);
                }
            }

            if let Some((sex, color)) = Self::sex_and_color(&cell.lower) {
                info.sex = Some(sex);
                info.color = color;
            }

            if let Some(bred_by) = strip_label(cell, labels::BRED_BY) {
                info.bred_by = Some(bred_by);
            }

            if let Some(deceased) = strip_label(cell, labels::DECEASED) {
                info.deceased = non_empty(&deceased.replacen('(', "", 1).replacen(')', "", 1));
            }
        }
    }

    /// `"bay mare"` -> Female, colour `bay`. Geldings count as male.
    fn sex_and_color(lower: &str) -> Option<(Sex, Option<String>)> {
        let mut found = None;
        for word in ["mare", "stallion", "gelding"] {
            let hit = SEX_WORD
                .find_iter(lower)
                .find(|m| m.as_str() == word)
                .map(|m| m.start());
            if let Some(start) = hit {
                let sex = if word == "mare" { Sex::Female } else { Sex::Male };
                found = Some((sex, non_empty(&lower[..start])));
            }
        }
        found
    }

    /// Innermost cell whose text contains a case-sensitive marker
    fn innermost_with<'c, 'a>(cells: &'c [Cell<'a>], marker: &str) -> impl Iterator<Item = &'c Cell<'a>> {
        let marker = marker.to_string();
        cells.iter().rev().filter(move |cell| cell.text.contains(&marker))
    }

    fn family(&self, cells: &[Cell<'_>]) -> Option<String> {
        Self::innermost_with(cells, labels::FAMILY).find_map(|cell| {
            cell.element
                .select(&self.family_value)
                .next()
                .and_then(|b| non_empty(&element_text(b)))
        })
    }

    fn taproot(&self, cells: &[Cell<'_>], page_url: Option<&Url>) -> Option<PedigreeNode> {
        Self::innermost_with(cells, labels::TAPROOT).find_map(|cell| {
            let link = cell.element.select(&self.taproot_link).next()?;
            let href = link.value().attr("href")?;
            extract_studbook_id(href).map(|_| PedigreeNode::new(element_text(link), resolve_link(page_url, href)))
        })
    }

    fn foal_ref(cells: &[Cell<'_>], name: &str) -> Option<String> {
        Self::innermost_with(cells, labels::FOAL_REF.trim_end()).find_map(|cell| {
            let text = cell.text.as_str();
            let after_name = match text.find(name) {
                Some(pos) if !name.is_empty() => &text[pos + name.len()..],
                _ => text,
            };
            let (_, after_label) = after_name.split_once(labels::FOAL_REF)?;
            after_label.split_whitespace().next().map(str::to_string)
        })
    }

    fn pedigree(&self, document: &Html, page_url: Option<&Url>) -> PedigreeTree {
        let nodes = document
            .select(&self.pedigree_item)
            .map(|link| {
                let href = link.value().attr("href").unwrap_or_default();
                let link_url = if href.is_empty() {
                    String::new()
                } else {
                    resolve_link(page_url, href)
                };
                PedigreeNode::new(element_text(link), link_url)
            })
            .collect();
        PedigreeTree::from_page_order(nodes)
    }
}

impl PageExtractor for HorseDetailParser {
    fn is_server_error(&self, page: &LoadedPage) -> bool {
        let document = Html::parse_document(&page.html);
        document
            .select(&self.error_heading)
            .any(|h1| element_text(h1).contains(&self.server_error_marker))
    }

    fn extract(&self, page: &LoadedPage) -> ParsingResult<HorseInfo> {
        let document = Html::parse_document(&page.html);
        let page_url = Url::parse(&page.url).ok();

        let name = document
            .select(&self.name)
            .next()
            .and_then(|cell| non_empty(&element_text(cell)))
            .ok_or_else(|| ParsingError::required_field_missing("name", Some(&page.url)))?;

        let cells = self.cells(&document);
        let mut info = HorseInfo {
            name,
            ..HorseInfo::default()
        };
        Self::read_labelled_fields(&cells, &mut info);
        info.family = self.family(&cells);
        info.taproot = self.taproot(&cells, page_url.as_ref());
        info.foal_ref = Self::foal_ref(&cells, &info.name);
        info.pedigree = self.pedigree(&document, page_url.as_ref());

        debug!(name = %info.name, url = %page.url, "Extracted horse detail page");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HORSE_900: &str = include_str!("../../../tests/fixtures/horse_900.html");
    const SERVER_ERROR: &str = include_str!("../../../tests/fixtures/server_error.html");
    const MISSING_NAME: &str = include_str!("../../../tests/fixtures/missing_name.html");

    fn page(html: &str) -> LoadedPage {
        LoadedPage {
            url: "https://www.studbook.org.au/Horse.aspx?hid=900".into(),
            status: 200,
            html: html.into(),
        }
    }

    #[test]
    fn extracts_all_fields_of_a_detail_page() {
        let parser = HorseDetailParser::new().unwrap();
        let info = parser.extract(&page(HORSE_900)).unwrap();

        assert_eq!(info.name, "Moonlight Sonata");
        assert_eq!(info.sex, Some(Sex::Female));
        assert_eq!(info.color.as_deref(), Some("bay"));
        assert_eq!(info.life_number.as_deref(), Some("036001A10099"));
        assert_eq!(info.date_of_birth.as_deref(), Some("15/06/2010"));
        assert_eq!(info.microchip_number.as_deref(), Some("985120012345678"));
        assert_eq!(info.dna_typed.as_deref(), Some("Yes"));
        assert_eq!(info.aust_id.as_deref(), Some("AU-4521"));
        assert_eq!(info.bred_by.as_deref(), Some("John McKenzie"));
        assert_eq!(info.deceased.as_deref(), Some("03/04/2024"));
        assert_eq!(info.family.as_deref(), Some("12-b"));
        assert_eq!(info.foal_ref.as_deref(), Some("MS2010"));

        let taproot = info.taproot.unwrap();
        assert_eq!(taproot.name, "Old Bess");
        assert_eq!(taproot.link, "https://www.studbook.org.au/Horse.aspx?hid=55");
        assert_eq!(taproot.studbook_id(), Some(55));
    }

    #[test]
    fn pedigree_links_land_in_slot_order() {
        let parser = HorseDetailParser::new().unwrap();
        let info = parser.extract(&page(HORSE_900)).unwrap();

        let subject = info.pedigree.subject().unwrap();
        assert_eq!(subject.name, "Moonlight Sonata");
        assert_eq!(subject.studbook_id(), Some(900));
        assert_eq!(info.pedigree.get(3).unwrap().name, "Todman");
        assert_eq!(info.pedigree.get(11).unwrap().name, "Evening Song");
        assert_eq!(info.pedigree.get(13).unwrap().studbook_id(), Some(1001));
    }

    #[test]
    fn server_error_heading_is_detected() {
        let parser = HorseDetailParser::new().unwrap();
        assert!(parser.is_server_error(&page(SERVER_ERROR)));
        assert!(!parser.is_server_error(&page(HORSE_900)));
    }

    #[test]
    fn page_without_name_is_missing_data() {
        let parser = HorseDetailParser::new().unwrap();
        let err = parser.extract(&page(MISSING_NAME)).unwrap_err();
        assert_eq!(err.missing_field(), Some("name"));
    }

    #[test]
    fn ancestor_names_do_not_override_sex_and_colour() {
        let html = r#"
            <table>
              <tr><td class="HeaderBlockNasuy">Iron Duke</td></tr>
              <tr><td>Bay stallion</td></tr>
            </table>
            <table class="Pedigree">
              <tr><td><a class="PedigreeItem" href="Horse.aspx?hid=1">Grey Mare</a></td></tr>
              <tr><td><a class="PedigreeItem" href="Horse.aspx?hid=2">Chestnut Gelding</a></td></tr>
            </table>
        "#;
        let parser = HorseDetailParser::new().unwrap();

        let info = parser.extract(&page(html)).unwrap();

        assert_eq!(info.sex, Some(Sex::Male));
        assert_eq!(info.color.as_deref(), Some("bay"));
        assert_eq!(info.pedigree.get(0).unwrap().name, "Grey Mare");
    }

    #[test]
    fn gelding_is_male_with_colour() {
        assert_eq!(
            HorseDetailParser::sex_and_color("chestnut gelding"),
            Some((Sex::Male, Some("chestnut".to_string())))
        );
        assert_eq!(
            HorseDetailParser::sex_and_color("grey stallion"),
            Some((Sex::Male, Some("grey".to_string())))
        );
        assert_eq!(HorseDetailParser::sex_and_color("mareeba downs"), None);
        assert_eq!(HorseDetailParser::sex_and_color("mare"), Some((Sex::Female, None)));
    }

    #[test]
    fn invalid_selector_is_reported() {
        let selectors = HorseDetailSelectors {
            name: "td[".into(),
            ..HorseDetailSelectors::default()
        };
        assert!(matches!(
            HorseDetailParser::with_selectors(&selectors),
            Err(ParsingError::InvalidSelector { .. })
        ));
    }
}
