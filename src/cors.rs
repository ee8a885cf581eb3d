use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::{options, Request, Response};

/// Adds permissive cross-origin headers to every response. The relay only exists so that
/// browser pages can reach the gateway, so any origin, method and header is allowed.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Permissive CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let methods = req
            .headers()
            .get_one("Access-Control-Request-Method")
            .unwrap_or("*")
            .to_string();
        let headers = req
            .headers()
            .get_one("Access-Control-Request-Headers")
            .unwrap_or("*")
            .to_string();

        res.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(Header::new("Access-Control-Allow-Methods", methods));
        res.set_header(Header::new("Access-Control-Allow-Headers", headers));
        res.set_header(Header::new("Access-Control-Expose-Headers", "*"));
    }
}

/// Answers any preflight request; the fairing supplies the headers.
#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::NoContent
}
