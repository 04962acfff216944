use crate::config::AppConfig;
use crate::mdx::highlight::escape_html;

/// Build the `<head>` meta block for a public page.
pub fn build_meta(
    config: &AppConfig,
    title: Option<&str>,
    description: Option<&str>,
    path: &str,
) -> String {
    let site_name = &config.site.name;
    let page_title = match title {
        Some(t) => format!("{} | {}", t, site_name),
        None => site_name.clone(),
    };
    let page_desc = description.unwrap_or(&config.site.tagline);
    let canonical = config.absolute_url(path);

    format!(
        r#"<title>{title}</title>
<meta name="description" content="{desc}">
<link rel="canonical" href="{canonical}">
<link rel="alternate" type="application/rss+xml" title="{site}" href="{feed}">
<meta property="og:title" content="{title}">
<meta property="og:description" content="{desc}">
<meta property="og:url" content="{canonical}">
<meta property="og:site_name" content="{site}">
<meta property="og:type" content="{og_type}">"#,
        title = escape_html(&page_title),
        desc = escape_html(page_desc),
        canonical = escape_html(&canonical),
        site = escape_html(site_name),
        feed = escape_html(&config.absolute_url("/feed")),
        og_type = if path.starts_with("/posts/") { "article" } else { "website" },
    )
}
