use std::io::Cursor;

use chrono::NaiveDateTime;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::config::AppConfig;
use crate::models::post::Post;
use crate::store::Store;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
/// Protocol cap per sitemap file.
const MAX_URLS: i64 = 50_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub url: String,
    pub last_modified: Option<NaiveDateTime>,
    pub change_frequency: String,
    pub priority: f32,
}

/// Static preset pages first, then one entry per published post.
pub fn build_entries(config: &AppConfig, posts: &[Post]) -> Vec<SitemapEntry> {
    let mut entries: Vec<SitemapEntry> = config
        .site
        .static_pages
        .iter()
        .map(|page| SitemapEntry {
            url: config.absolute_url(page.path),
            last_modified: None,
            change_frequency: page.change_frequency.to_string(),
            priority: page.priority,
        })
        .collect();

    entries.extend(posts.iter().filter(|p| p.is_published()).map(|post| SitemapEntry {
        url: config.absolute_url(&format!("/posts/{}", post.slug)),
        last_modified: Some(post.updated_at),
        change_frequency: "weekly".to_string(),
        priority: 0.7,
    }));

    entries
}

/// Serialize as sitemap 0.9 XML. Text content is escaped by the writer.
pub fn to_xml(entries: &[SitemapEntry]) -> Result<String, String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| e.to_string())?;
    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", SITEMAP_NS));
    writer
        .write_event(Event::Start(urlset))
        .map_err(|e| e.to_string())?;

    for entry in entries {
        writer
            .write_event(Event::Start(BytesStart::new("url")))
            .map_err(|e| e.to_string())?;
        write_text(&mut writer, "loc", &entry.url)?;
        if let Some(modified) = entry.last_modified {
            write_text(&mut writer, "lastmod", &modified.format("%Y-%m-%d").to_string())?;
        }
        write_text(&mut writer, "changefreq", &entry.change_frequency)?;
        write_text(&mut writer, "priority", &format!("{:.1}", entry.priority))?;
        writer
            .write_event(Event::End(BytesEnd::new("url")))
            .map_err(|e| e.to_string())?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("urlset")))
        .map_err(|e| e.to_string())?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| e.to_string())
}

fn write_text(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) -> Result<(), String> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(|e| e.to_string())?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(|e| e.to_string())?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Generate sitemap.xml content from the store.
pub fn generate_sitemap(store: &dyn Store, config: &AppConfig) -> Result<String, String> {
    let posts = store.post_published(MAX_URLS, 0);
    to_xml(&build_entries(config, &posts))
}

/// Generate robots.txt content pointing at the sitemap.
pub fn generate_robots(config: &AppConfig) -> String {
    format!(
        "User-agent: *\nAllow: /\nDisallow: /api/\n\nSitemap: {}\n",
        config.absolute_url("/sitemap.xml")
    )
}
