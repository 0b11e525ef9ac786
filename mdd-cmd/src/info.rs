use std::collections::HashMap;
use std::fs::File;
use std::io::{stdout, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use handlebars::handlebars_helper;
use mdd::dump::{read_sections, summary::NodeLatest, SectionInfo};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    sections: Vec<SectionInfo>,
}

fn summarize(fpath: &Path) -> Result<Info> {
    let file = File::open(fpath).context("opening input")?;
    let mut sections: Vec<SectionInfo> = Vec::new();
    for zult in read_sections(BufReader::new(file)) {
        match zult {
            Ok(section) => sections.push(section.info()),
            Err(err) => {
                warn!(path = %fpath.display(), %err, "stopping at malformed section");
                break;
            }
        }
    }
    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        sections,
    })
}

pub fn info(fpaths: &[PathBuf], format: &Format) -> Result<()> {
    let infos = fpaths
        .iter()
        .map(|p| summarize(p))
        .collect::<Result<Vec<Info>>>()?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &infos).context("serializing to json")
        }
        Format::Text => {
            for info in &infos {
                let data = render_text(info).context("rendering info")?;
                stdout()
                    .write_all(str::as_bytes(&data))
                    .context("writing to stdout")?;
            }
            Ok(())
        }
    }
}

pub fn print_latest(nodes: &HashMap<u16, NodeLatest>, format: &Format) -> Result<()> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), nodes).context("serializing to json")
        }
        Format::Text => {
            let mut nodes: Vec<(&u16, &NodeLatest)> = nodes.iter().collect();
            nodes.sort_by_key(|(node, _)| **node);
            let mut out = stdout();
            writeln!(out, "node    latest offset  latest time")?;
            for (node, latest) in nodes {
                writeln!(
                    out,
                    "{node:<6}  {:>13}  {}",
                    latest.end,
                    latest.time.to_rfc3339()
                )?;
            }
            Ok(())
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let mut num: usize = usize::try_from(num).unwrap();
        if num < v.len() {
            num = v.len();
        }
        let mut s = String::new();
        for _ in 0..(num - v.len()) {
            s.push(' ');
        }
        s.push_str(&v);
        s
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    assert!(hb.register_template_string("info", TEXT_TEMPLATE).is_ok());

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================
{{ #if sections }}  Node   Port        Start          End  Time
{{ #each sections }}{{ lpad 6 node }} {{ lpad 6 port }} {{ lpad 12 start }} {{ lpad 12 end }}  {{ time }}
{{ /each }}{{ else }}no sections
{{ /if }}
";
