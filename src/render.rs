use crate::config::AppConfig;
use crate::mdx::highlight::escape_html;
use crate::mdx::{CompiledMdx, TocEntry, TocLevel};
use crate::models::category::Category;
use crate::models::post::Post;
use crate::models::tag::Tag;
use crate::seo::build_meta;

const EXCERPT_WORDS: usize = 40;

/// A post as shown in a listing.
pub struct ListedPost {
    pub post: Post,
    pub author: Option<String>,
}

/// Everything the article page shows besides the compiled body.
pub struct ArticleView<'a> {
    pub post: &'a Post,
    pub compiled: &'a CompiledMdx,
    pub tags: &'a [Tag],
    pub category: Option<&'a Category>,
    pub author: Option<&'a str>,
}

// ── Layout ──

fn layout(config: &AppConfig, meta: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{meta}
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@0.16/dist/katex.min.css">
</head>
<body>
<header class="site-header">
<a class="site-title" href="/">{name}</a>
<p class="site-tagline">{tagline}</p>
</header>
<main>
{body}
</main>
<footer class="site-footer"><a href="/feed">RSS</a></footer>
</body>
</html>"#,
        meta = meta,
        name = escape_html(&config.site.name),
        tagline = escape_html(&config.site.tagline),
        body = body,
    )
}

// ── Listings ──

pub fn render_home(config: &AppConfig, posts: &[ListedPost], page: i64, total_pages: i64) -> String {
    let meta = build_meta(config, None, None, "/");
    let body = render_post_list(config, None, posts, page, total_pages);
    layout(config, &meta, &body)
}

pub fn render_category(
    config: &AppConfig,
    category: &Category,
    posts: &[ListedPost],
    page: i64,
    total_pages: i64,
) -> String {
    let path = format!("/category/{}", category.slug);
    let meta = build_meta(
        config,
        Some(&category.name),
        category.description.as_deref(),
        &path,
    );
    let heading = format!("Category: {}", category.name);
    let body = render_post_list(config, Some(&heading), posts, page, total_pages);
    layout(config, &meta, &body)
}

pub fn render_tag(
    config: &AppConfig,
    tag: &Tag,
    posts: &[ListedPost],
    page: i64,
    total_pages: i64,
) -> String {
    let path = format!("/tag/{}", tag.slug);
    let meta = build_meta(config, Some(&tag.name), tag.description.as_deref(), &path);
    let heading = format!("Tagged: {}", tag.name);
    let body = render_post_list(config, Some(&heading), posts, page, total_pages);
    layout(config, &meta, &body)
}

fn render_post_list(
    config: &AppConfig,
    heading: Option<&str>,
    posts: &[ListedPost],
    page: i64,
    total_pages: i64,
) -> String {
    let mut html = String::from("<section class=\"post-list\">\n");
    if let Some(h) = heading {
        html.push_str(&format!("<h1>{}</h1>\n", escape_html(h)));
    }
    if posts.is_empty() {
        html.push_str("<p>No posts yet.</p>\n");
    }

    for listed in posts {
        let post = &listed.post;
        let excerpt = post
            .excerpt
            .as_deref()
            .map(|e| truncate_words(e, EXCERPT_WORDS))
            .unwrap_or_default();

        let mut meta_parts: Vec<String> = Vec::new();
        if config.site.show_author {
            if let Some(author) = &listed.author {
                meta_parts.push(format!(
                    "<span class=\"post-author\">{}</span>",
                    escape_html(author)
                ));
            }
        }
        if let Some(date) = post.published_at {
            meta_parts.push(format!(
                "<time datetime=\"{}\">{}</time>",
                date.format("%Y-%m-%d"),
                date.format("%B %-d, %Y")
            ));
        }

        html.push_str(&format!(
            "<article class=\"post-card\">\n<h2><a href=\"/posts/{slug}\">{title}</a></h2>\n<div class=\"post-meta\">{meta}</div>\n<p>{excerpt}</p>\n</article>\n",
            slug = escape_html(&post.slug),
            title = escape_html(&post.title),
            meta = meta_parts.join(" &middot; "),
            excerpt = escape_html(&excerpt),
        ));
    }

    if total_pages > 1 {
        html.push_str(&build_pagination(page, total_pages));
    }
    html.push_str("</section>");
    html
}

fn build_pagination(current: i64, total: i64) -> String {
    let mut html = String::from(r#"<nav class="pagination">"#);
    if current > 1 {
        html.push_str(&format!(r#"<a href="?page={}">&laquo; Prev</a>"#, current - 1));
    }
    for p in 1..=total {
        if p == current {
            html.push_str(&format!(r#"<span class="current">{}</span>"#, p));
        } else {
            html.push_str(&format!(r#"<a href="?page={}">{}</a>"#, p, p));
        }
    }
    if current < total {
        html.push_str(&format!(r#"<a href="?page={}">Next &raquo;</a>"#, current + 1));
    }
    html.push_str("</nav>");
    html
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        let mut result = words[..max_words].join(" ");
        result.push('…');
        result
    }
}

// ── Article ──

pub fn render_article(config: &AppConfig, view: &ArticleView) -> String {
    let post = view.post;
    let path = format!("/posts/{}", post.slug);
    let meta = build_meta(config, Some(&post.title), post.excerpt.as_deref(), &path);

    let mut html = String::from("<article class=\"post\">\n");
    if let Some(image) = &post.featured_image_url {
        html.push_str(&format!(
            "<img class=\"featured\" src=\"{}\" alt=\"\">\n",
            escape_html(image)
        ));
    }
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(&post.title)));

    let mut meta_parts: Vec<String> = Vec::new();
    if config.site.show_author {
        if let Some(author) = view.author {
            meta_parts.push(format!("By {}", escape_html(author)));
        }
    }
    if let Some(date) = post.published_at {
        meta_parts.push(format!(
            "<time datetime=\"{}\">{}</time>",
            date.format("%Y-%m-%d"),
            date.format("%B %-d, %Y")
        ));
    }
    if let Some(category) = view.category {
        meta_parts.push(format!(
            "<a class=\"category\" href=\"/category/{}\">{}</a>",
            escape_html(&category.slug),
            escape_html(&category.name)
        ));
    }
    html.push_str(&format!(
        "<div class=\"post-meta\">{}</div>\n",
        meta_parts.join(" &middot; ")
    ));

    html.push_str(&build_toc(&view.compiled.toc));
    html.push_str("<div class=\"post-body\">\n");
    html.push_str(&view.compiled.compiled_source);
    html.push_str("</div>\n");

    if !view.tags.is_empty() {
        html.push_str("<ul class=\"tags\">");
        for tag in view.tags {
            html.push_str(&format!(
                "<li><a href=\"/tag/{}\">#{}</a></li>",
                escape_html(&tag.slug),
                escape_html(&tag.name)
            ));
        }
        html.push_str("</ul>\n");
    }
    html.push_str("</article>");

    layout(config, &meta, &html)
}

/// Nested list of heading links; empty when the document has no headings.
fn build_toc(toc: &[TocEntry]) -> String {
    if toc.is_empty() {
        return String::new();
    }
    let mut html = String::from("<nav class=\"toc\"><h2>Contents</h2><ul>");
    for entry in toc {
        let class = match entry.level {
            TocLevel::One => "toc-1",
            TocLevel::Two => "toc-2",
            TocLevel::Three => "toc-3",
        };
        html.push_str(&format!(
            "<li class=\"{}\"><a href=\"#{}\">{}</a></li>",
            class,
            escape_html(&entry.slug),
            escape_html(&entry.text)
        ));
    }
    html.push_str("</ul></nav>\n");
    html
}

// ── Account pages ──

/// Landing page for the emailed verification link.
pub fn render_verify_page(config: &AppConfig, token: &str) -> String {
    let meta = build_meta(config, Some("Verify your email"), None, "/account/verify");
    let body = format!(
        r#"<section class="account">
<h1>Verify your email</h1>
<form method="post" action="/api/auth/verify-email?token={token}">
<button type="submit">Confirm email address</button>
</form>
</section>"#,
        token = escape_html(token),
    );
    layout(config, &meta, &body)
}

/// Landing page for the emailed reset link.
pub fn render_reset_page(config: &AppConfig, token: &str, notice: Option<&str>) -> String {
    let meta = build_meta(config, Some("Choose a new password"), None, "/account/reset");
    let notice_html = notice
        .map(|n| format!("<p class=\"notice\">{}</p>\n", escape_html(n)))
        .unwrap_or_default();
    let body = format!(
        r#"<section class="account">
<h1>Choose a new password</h1>
{notice}<form method="post" action="/account/reset">
<input type="hidden" name="token" value="{token}">
<input type="password" name="password" minlength="8" required>
<button type="submit">Set password</button>
</form>
</section>"#,
        notice = notice_html,
        token = escape_html(token),
    );
    layout(config, &meta, &body)
}

// ── Errors ──

pub fn render_not_found(config: &AppConfig) -> String {
    let meta = build_meta(config, Some("Not found"), None, "/");
    layout(
        config,
        &meta,
        "<section class=\"error\"><h1>404</h1><p>Page not found.</p><a href=\"/\">&larr; Home</a></section>",
    )
}

/// Fallback page that needs no state.
pub fn render_bare_error(code: u16, message: &str) -> String {
    format!(
        "<html><body style='font-family:sans-serif;text-align:center;padding:80px'><h1>{}</h1><p>{}</p><a href='/'>&larr; Home</a></body></html>",
        code,
        escape_html(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_appends_ellipsis() {
        assert_eq!(truncate_words("a b c", 5), "a b c");
        assert_eq!(truncate_words("a b c d", 2), "a b…");
    }

    #[test]
    fn pagination_marks_current() {
        let html = build_pagination(2, 3);
        assert!(html.contains("<span class=\"current\">2</span>"));
        assert!(html.contains("?page=1"));
        assert!(html.contains("?page=3\">Next"));
    }

    #[test]
    fn toc_links_to_heading_ids() {
        let toc = vec![TocEntry {
            level: TocLevel::Two,
            text: "A <b>".into(),
            slug: "a-b".into(),
        }];
        let html = build_toc(&toc);
        assert!(html.contains("href=\"#a-b\""));
        assert!(html.contains("A &lt;b&gt;"));
        assert!(build_toc(&[]).is_empty());
    }
}
