//! Askama template structs backing the handler chain's HTML responses.

use askama::Template;

#[derive(Template)]
#[template(path = "welcome.html")]
pub struct WelcomeTemplate;

#[derive(Template)]
#[template(path = "status.html")]
pub struct StatusTemplate {
    pub code: u16,
    pub reason: String,
}

pub struct ListingSection {
    pub name: String,
    pub links: Vec<String>,
}

#[derive(Template)]
#[template(path = "listing.html")]
pub struct ListingTemplate {
    pub kind: String,
    pub sections: Vec<ListingSection>,
}

#[derive(Template)]
#[template(path = "created.html")]
pub struct CreatedTemplate {
    pub kind: String,
    pub uuid: String,
}

#[derive(Template)]
#[template(path = "deleted.html")]
pub struct DeletedTemplate {
    pub kind: String,
    pub uuid: String,
}

#[derive(Template)]
#[template(path = "xslt_error.html")]
pub struct XsltErrorTemplate {
    pub reason: String,
}
