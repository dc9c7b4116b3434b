//! Static HTML help pages, one per API generation.

use std::fmt::Write;

use crate::config::ApiVersion;
use crate::models::MAX_RADIUS_ARCSEC;

struct Param {
    name: &'static str,
    text: &'static str,
}

struct Endpoint {
    path: &'static str,
    summary: &'static str,
    params: &'static [Param],
    example: &'static str,
}

const OID: Param = Param {
    name: "oid",
    text: "object identifier. Mandatory, may be repeated",
};
const RA: Param = Param {
    name: "ra",
    text: "right ascension of the circle center, degrees. Mandatory",
};
const DEC: Param = Param {
    name: "dec",
    text: "declination of the circle center, degrees. Mandatory",
};
const RADIUS: Param = Param {
    name: "radius_arcsec",
    text: "circle radius, arcseconds, positive and not above the maximum below. Mandatory",
};
const FILTER: Param = Param {
    name: "filter",
    text: "keep only these passbands (zg, zr, zi). Optional, may be repeated",
};
const NOT_FILTER: Param = Param {
    name: "not_filter",
    text: "drop these passbands. Optional, may be repeated",
};
const FIELDID: Param = Param {
    name: "fieldid",
    text: "keep only these survey fields. Optional, may be repeated",
};
const NOT_FIELDID: Param = Param {
    name: "not_fieldid",
    text: "drop these survey fields. Optional, may be repeated",
};

const CIRCLE_PARAMS: &[Param] = &[RA, DEC, RADIUS, FILTER, NOT_FILTER, FIELDID, NOT_FIELDID];

const V1: &[Endpoint] = &[
    Endpoint {
        path: "/api/v1/oid/full/json",
        summary: "Summaries and light curves of DR1 objects by identifier",
        params: &[OID],
        example: "/api/v1/oid/full/json?oid=695211400034403",
    },
    Endpoint {
        path: "/api/v1/circle/full/json",
        summary: "Summaries and light curves of DR1 objects inside a circle",
        params: CIRCLE_PARAMS,
        example: "/api/v1/circle/full/json?ra=292.4&dec=44.6&radius_arcsec=10",
    },
    Endpoint {
        path: "/api/v1/circle/oid/json",
        summary: "Identifiers of DR1 objects inside a circle",
        params: CIRCLE_PARAMS,
        example: "/api/v1/circle/oid/json?ra=292.4&dec=44.6&radius_arcsec=10",
    },
];

const V2: &[Endpoint] = &[
    Endpoint {
        path: "/api/v2/oid/full/json",
        summary: "Summaries and light curves of DR2 objects by identifier",
        params: &[OID],
        example: "/api/v2/oid/full/json?oid=830202400008402",
    },
    Endpoint {
        path: "/api/v2/circle/full/json",
        summary: "Summaries and light curves of DR2 objects inside a circle",
        params: CIRCLE_PARAMS,
        example: "/api/v2/circle/full/json?ra=10&dec=30&radius_arcsec=10",
    },
];

const V3: &[Endpoint] = &[
    Endpoint {
        path: "/api/v3/dr/list/json",
        summary: "Names of the data releases this service exposes",
        params: &[],
        example: "/api/v3/dr/list/json",
    },
    Endpoint {
        path: "/api/v3/data/{dr}/oid/full/json",
        summary: "Summaries and light curves of one release's objects by identifier",
        params: &[OID],
        example: "/api/v3/data/latest/oid/full/json?oid=830202400008402",
    },
    Endpoint {
        path: "/api/v3/data/{dr}/circle/full/json",
        summary: "Summaries and light curves of one release's objects inside a circle",
        params: CIRCLE_PARAMS,
        example: "/api/v3/data/latest/circle/full/json?ra=10&dec=30&radius_arcsec=10",
    },
];

/// Render the help page of one API generation.
pub fn page(version: ApiVersion) -> String {
    let endpoints = match version {
        ApiVersion::V1 => V1,
        ApiVersion::V2 => V2,
        ApiVersion::V3 => V3,
    };

    let mut html = format!("<h1>API {} resources</h1>\n", version);
    for endpoint in endpoints {
        // Writing into a String cannot fail.
        let _ = writeln!(html, "<h2><code>{}</code></h2>", endpoint.path);
        let _ = writeln!(html, "<p>{}</p>", endpoint.summary);
        if !endpoint.params.is_empty() {
            html.push_str("<p>Query parameters:</p>\n<ul>\n");
            for param in endpoint.params {
                let _ = writeln!(html, "<li><code>{}</code>: {}</li>", param.name, param.text);
            }
            html.push_str("</ul>\n");
        }
        let _ = writeln!(
            html,
            "<p>Example: <a href=\"{0}\"><code>{0}</code></a></p>",
            endpoint.example
        );
    }
    let _ = writeln!(
        html,
        "<p>Maximum circle radius: {} arcseconds.</p>",
        MAX_RADIUS_ARCSEC
    );
    html
}

/// Welcome page linking the help of every enabled generation.
pub fn index(versions: impl Iterator<Item = ApiVersion>) -> String {
    let mut html = String::from("<h1>ZTF light curves</h1>\n<ul>\n");
    for version in versions {
        let _ = writeln!(
            html,
            "<li>API {0}: see <a href=\"/api/{0}/help\">/api/{0}/help</a></li>",
            version
        );
    }
    html.push_str("</ul>\n");
    html
}
