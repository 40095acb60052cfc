use anyhow::{ensure, Result};

/// Values substituted into the `ova.xml` appliance descriptor.
#[derive(Debug, Clone)]
pub struct DescriptorConfig {
    pub vm_name_label: String,
    pub vm_name_description: String,
    pub memory_bytes: u64,
    pub vcpus: u32,
    pub root_vdi_virtual_size_bytes: u64,
    pub root_vdi_ref: String,
}

const TEMPLATE: &str = include_str!("ova.xml.in");

/// Renders the XVA version-2 `ova.xml` descriptor for one VM with a single
/// root disk. Fails if the template carries a placeholder the config does not
/// cover.
pub fn render(cfg: &DescriptorConfig) -> Result<String> {
    let xml = TEMPLATE
        .replace("${vm_name_label}", &xml_escape(&cfg.vm_name_label))
        .replace("${vm_name_description}", &xml_escape(&cfg.vm_name_description))
        .replace("${memory_bytes}", &cfg.memory_bytes.to_string())
        .replace("${vcpus}", &cfg.vcpus.to_string())
        .replace(
            "${root_vdi_virtual_size_bytes}",
            &cfg.root_vdi_virtual_size_bytes.to_string(),
        )
        .replace("${root_vdi_ref}", &cfg.root_vdi_ref);
    ensure!(!xml.contains("${"), "unsubstituted placeholder in ova.xml template");
    Ok(xml)
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
