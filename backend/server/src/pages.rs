//! Server-rendered HTML for the public profile and the page shells.
use caldate_payloads::{
    ProfileView, ThemeId,
    handle::profile_path,
    onboarding::{ONBOARD_PATH, SETTINGS_PATH},
    theme::Palette,
};

const SITE_NAME: &str = "cal.date";

pub fn escape_html(input: &str) -> String {
    input
        .chars()
        .map(|ch| match ch {
            '<' => "&lt;".into(),
            '>' => "&gt;".into(),
            '&' => "&amp;".into(),
            '"' => "&quot;".into(),
            '\'' => "&#39;".into(),
            _ => ch.to_string(),
        })
        .collect::<String>()
}

fn style(theme: ThemeId) -> String {
    let palette = theme.palette();

    format!(
        "<style>:root{{--bg:{};--surface:{};--text:{};--muted:{};--accent:{}}}\
         body{{margin:0;font-family:system-ui,sans-serif;background:var(--bg);color:var(--text)}}\
         main{{max-width:960px;margin:0 auto;padding:2rem}}\
         .muted{{color:var(--muted)}}\
         .avatar{{width:160px;height:160px;border-radius:50%;object-fit:cover}}\
         .placeholder{{display:flex;align-items:center;justify-content:center;background:var(--surface);font-size:3rem}}\
         .gallery{{display:grid;grid-template-columns:repeat(3,1fr);gap:.5rem}}\
         .gallery img{{width:100%;aspect-ratio:1;object-fit:cover}}\
         .book{{display:inline-block;padding:.75rem 1.5rem;background:var(--accent);color:var(--surface);text-decoration:none}}</style>",
        Palette::css(palette.background),
        Palette::css(palette.surface),
        Palette::css(palette.text),
        Palette::css(palette.muted),
        Palette::css(palette.accent),
    )
}

fn document(title: &str, head: &str, theme: ThemeId, body: &str) -> String {
    format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{}</title>{head}{}</head><body>{body}</body></html>",
        escape_html(title),
        style(theme),
    )
}

fn meta_tags(title: &str, description: &str, page_url: &str, image_url: &str) -> String {
    let title = escape_html(title);
    let description = escape_html(description);

    format!(
        "<meta name=\"description\" content=\"{description}\">\
         <meta property=\"og:title\" content=\"{title}\">\
         <meta property=\"og:description\" content=\"{description}\">\
         <meta property=\"og:url\" content=\"{}\">\
         <meta property=\"og:site_name\" content=\"{SITE_NAME}\">\
         <meta property=\"og:type\" content=\"profile\">\
         <meta property=\"og:image\" content=\"{image}\">\
         <meta property=\"og:image:width\" content=\"1200\">\
         <meta property=\"og:image:height\" content=\"630\">\
         <meta name=\"twitter:card\" content=\"summary_large_image\">\
         <meta name=\"twitter:title\" content=\"{title}\">\
         <meta name=\"twitter:description\" content=\"{description}\">\
         <meta name=\"twitter:image\" content=\"{image}\">",
        escape_html(page_url),
        image = escape_html(image_url),
    )
}

/// Public profile page; `is_owner` adds the settings link.
pub fn profile_page(view: &ProfileView, handle: &str, is_owner: bool, site_url: &str) -> String {
    let site_url = site_url.trim_end_matches('/');
    let name = view.title();
    let title = format!("{name} | {SITE_NAME}");
    let description = view
        .bio
        .clone()
        .unwrap_or_else(|| format!("Book a date with {name} on {SITE_NAME}"));

    let head = meta_tags(
        &title,
        &description,
        &format!("{site_url}{}", profile_path(handle)),
        &format!("{site_url}/{handle}/og"),
    );

    let mut body = String::from("<header>");
    body.push_str(&format!("<a href=\"/\">{SITE_NAME}</a> "));
    body.push_str(&format!("<span class=\"muted\">/{}</span>", escape_html(handle)));
    if is_owner {
        body.push_str(&format!(" <a href=\"{SETTINGS_PATH}\">Settings</a>"));
    }
    body.push_str("</header><main><section>");

    match &view.avatar_url {
        Some(url) => body.push_str(&format!(
            "<img class=\"avatar\" src=\"{}\" alt=\"{}\">",
            escape_html(url),
            escape_html(name)
        )),
        None => body.push_str(&format!(
            "<div class=\"avatar placeholder\">{}</div>",
            escape_html(&name.chars().take(1).collect::<String>().to_uppercase())
        )),
    }

    body.push_str(&format!("<h1>{}</h1>", escape_html(name)));
    body.push_str(&format!("<p class=\"muted\">@{}</p>", escape_html(handle)));

    if let Some(bio) = &view.bio {
        body.push_str(&format!("<h2 class=\"muted\">About</h2><p>{}</p>", escape_html(bio)));
    }
    if let Some(booking_url) = &view.booking_url {
        body.push_str(&format!(
            "<p><a class=\"book\" href=\"{}\" rel=\"noopener\">Book a date</a></p>",
            escape_html(booking_url)
        ));
    }
    body.push_str("</section>");

    if !view.photos.is_empty() {
        body.push_str("<section class=\"gallery\">");
        for (index, photo) in view.photos.iter().enumerate() {
            body.push_str(&format!(
                "<img src=\"{}\" alt=\"Photo {}\" loading=\"lazy\">",
                escape_html(&photo.url),
                index + 1
            ));
        }
        body.push_str("</section>");
    }
    body.push_str("</main>");

    document(&title, &head, view.theme, &body)
}

pub fn not_found_page() -> String {
    document(
        &format!("Profile not found | {SITE_NAME}"),
        "",
        ThemeId::default(),
        "<main><h1>Profile not found</h1><p><a href=\"/\">Back home</a></p></main>",
    )
}

/// Client-driven pages; the server only gates and serves the shell.
pub fn shell_page(path: &str) -> String {
    let heading = match path {
        ONBOARD_PATH => "Set up your profile",
        SETTINGS_PATH => "Settings",
        _ => SITE_NAME,
    };

    document(
        &format!("{heading} | {SITE_NAME}"),
        "",
        ThemeId::default(),
        &format!(
            "<main><h1>{}</h1><div id=\"app\" data-page=\"{}\"></div></main>",
            escape_html(heading),
            escape_html(path)
        ),
    )
}
