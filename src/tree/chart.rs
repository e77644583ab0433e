//! Family chart output.
//!
//! The tree hands a [`ChartData`] snapshot to a renderer. The HTML renderer
//! produces a standalone page driving the family-chart widget.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::Person;
use crate::config::{CardConfig, ChartConfig};
use crate::error::Result;

/// Layout settings passed through to the chart widget.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSettings {
    pub node_separation: u32,
    pub level_separation: u32,
    pub card_dim: CardConfig,
    pub mini_tree: bool,
    pub link_break: bool,
}

impl From<&ChartConfig> for ChartSettings {
    fn from(config: &ChartConfig) -> Self {
        Self {
            node_separation: config.node_separation,
            level_separation: config.level_separation,
            card_dim: config.card,
            mini_tree: true,
            link_break: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub data: Vec<Person>,
    #[serde(flatten)]
    pub settings: ChartSettings,
}

impl ChartData {
    /// Copies `persons`, pointing each avatar at `<avatar_dir>/<id>.jpg`.
    pub fn new(persons: &[Person], config: &ChartConfig) -> Self {
        let avatar_dir = config.avatar_dir.trim_end_matches('/');
        let data = persons
            .iter()
            .cloned()
            .map(|mut person| {
                person.data.avatar = Some(format!("{}/{}.jpg", avatar_dir, person.id));
                person
            })
            .collect();

        Self {
            data,
            settings: ChartSettings::from(config),
        }
    }
}

pub trait ChartRenderer {
    fn render(&self, chart: &ChartData, out: &mut dyn Write) -> Result<()>;

    /// Suggested file extension for the output
    fn extension(&self) -> &'static str;

    /// `path`, with [`extension`](Self::extension) added when it has none.
    fn output_path(&self, path: &Path) -> PathBuf {
        let mut path = path.to_path_buf();
        if path.extension().is_none() {
            path.set_extension(self.extension());
        }
        path
    }
}

/// Raw chart data as JSON, for use with a page of your own.
pub struct JsonChartRenderer;

impl ChartRenderer for JsonChartRenderer {
    fn render(&self, chart: &ChartData, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, chart)?;
        writeln!(out)?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

pub struct HtmlChartRenderer {
    d3_url: String,
    script_url: String,
}

impl HtmlChartRenderer {
    pub fn new(config: &ChartConfig) -> Self {
        Self {
            d3_url: config.d3_url.clone(),
            script_url: config.script_url.clone(),
        }
    }
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Family tree</title>
<style>
  body { margin: 0; background: rgb(33, 33, 33); }
  #FamilyChart { width: 100vw; height: 100vh; color: #fff; }
</style>
"#;

const PAGE_SCRIPT: &str = r##"
const store = f3.createStore({
  data: chart.data,
  node_separation: chart.node_separation,
  level_separation: chart.level_separation
});
const view = f3.d3AnimationView({
  store,
  cont: document.querySelector("#FamilyChart")
});
const Card = f3.elements.Card({
  store,
  svg: view.svg,
  card_dim: chart.card_dim,
  card_display: [
    d => `${d.data.name || ''} ${d.data.surname || ''}`,
    d => `${d.data.birthday || ''}`
  ],
  mini_tree: chart.mini_tree,
  link_break: chart.link_break
});
view.setCard(Card);
store.setOnUpdate(props => view.update(props || {}));
store.update.tree({ initial: true });
"##;

impl ChartRenderer for HtmlChartRenderer {
    fn render(&self, chart: &ChartData, out: &mut dyn Write) -> Result<()> {
        // "</" inside the embedded JSON would end the script element early
        let json = serde_json::to_string(chart)?.replace("</", "<\\/");

        out.write_all(PAGE_HEAD.as_bytes())?;
        writeln!(out, r#"<script src="{}"></script>"#, escape_attr(&self.d3_url))?;
        writeln!(out, r#"<script src="{}"></script>"#, escape_attr(&self.script_url))?;
        writeln!(out, "</head>")?;
        writeln!(out, "<body>")?;
        writeln!(out, r#"<div id="FamilyChart" class="f3"></div>"#)?;
        writeln!(out, "<script>")?;
        writeln!(out, "const chart = {};", json)?;
        out.write_all(PAGE_SCRIPT.as_bytes())?;
        writeln!(out, "</script>")?;
        writeln!(out, "</body>")?;
        writeln!(out, "</html>")?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "html"
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{PersonData, PersonId};

    fn persons() -> Vec<Person> {
        let mut anna = Person::placeholder(PersonId::new("anna").unwrap());
        anna.data = PersonData {
            name: Some("Anna</script>".to_string()),
            ..Default::default()
        };
        vec![anna, Person::placeholder(PersonId::new("ben").unwrap())]
    }

    #[test]
    fn test_chart_data_sets_avatars_on_copy() {
        let persons = persons();
        let chart = ChartData::new(&persons, &ChartConfig::default());

        assert_eq!(chart.data[0].data.avatar.as_deref(), Some("./images/anna.jpg"));
        assert_eq!(chart.data[1].data.avatar.as_deref(), Some("./images/ben.jpg"));
        assert!(persons[0].data.avatar.is_none());
        assert_eq!(chart.settings.node_separation, 250);
        assert_eq!(chart.settings.level_separation, 150);
    }

    #[test]
    fn test_json_renderer() {
        let chart = ChartData::new(&persons(), &ChartConfig::default());
        let mut out = Vec::new();
        JsonChartRenderer.render(&chart, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["data"].as_array().unwrap().len(), 2);
        assert_eq!(value["card_dim"]["w"], 220);
        assert_eq!(value["mini_tree"], true);
        assert_eq!(value["link_break"], false);
    }

    #[test]
    fn test_output_path_defaults_extension() {
        let html = HtmlChartRenderer::new(&ChartConfig::default());
        assert_eq!(html.output_path(Path::new("out/family")), PathBuf::from("out/family.html"));
        assert_eq!(JsonChartRenderer.output_path(Path::new("family")), PathBuf::from("family.json"));
        assert_eq!(JsonChartRenderer.output_path(Path::new("family.txt")), PathBuf::from("family.txt"));
    }

    #[test]
    fn test_html_renderer_embeds_data_safely() {
        let config = ChartConfig::default();
        let chart = ChartData::new(&persons(), &config);
        let mut out = Vec::new();
        HtmlChartRenderer::new(&config).render(&chart, &mut out).unwrap();

        let html = String::from_utf8(out).unwrap();
        assert!(html.contains(&config.script_url));
        assert!(html.contains("f3.createStore"));
        assert!(html.contains("document.querySelector(\"#FamilyChart\")"));
        assert!(html.contains(PAGE_SCRIPT));
        assert!(html.contains(r#"Anna<\/script>"#));
        assert_eq!(html.matches("</script>").count(), 3);
    }
}
