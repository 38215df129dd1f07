//! Region catalog data model
//!
//! These types mirror the JSON served by the regions list endpoint and are
//! also what ends up, ranked and annotated with latencies, in the persisted
//! snapshot.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Top-level envelope returned by the regions list endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CatalogEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub regions: Vec<Region>,
}

/// A named point of presence offering one or more server groups
///
/// The catalog spells the two compound flags in snake case; snapshots use
/// the camel case names that snapshot consumers read. Both spellings are
/// accepted on input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(
        default,
        rename(serialize = "autoRegion"),
        alias = "autoRegion",
        deserialize_with = "null_as_default"
    )]
    pub auto_region: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dns: String,
    #[serde(
        default,
        rename(serialize = "portForward"),
        alias = "portForward",
        deserialize_with = "null_as_default"
    )]
    pub port_forward: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub geo: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub offline: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub servers: ServerGroup,
}

/// Servers of a region, one list per transport family
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub ikev2: Vec<Server>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub meta: Vec<Server>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub ovpntcp: Vec<Server>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub ovpnudp: Vec<Server>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub wg: Vec<Server>,
}

/// One connectable endpoint within a server group
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Server {
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cn: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub van: bool,
    /// Measured connect latency; `None` until a probe succeeded
    #[serde(default, skip_serializing_if = "Option::is_none", with = "latency_nanos")]
    pub latency: Option<Duration>,
}

/// Transport families a region can offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFamily {
    IkeV2,
    Meta,
    OpenVpnTcp,
    OpenVpnUdp,
    WireGuard,
}

impl TransportFamily {
    /// The only family that is currently probed
    pub const PROBED: TransportFamily = TransportFamily::WireGuard;

    /// Key used for this family in the catalog JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportFamily::IkeV2 => "ikev2",
            TransportFamily::Meta => "meta",
            TransportFamily::OpenVpnTcp => "ovpntcp",
            TransportFamily::OpenVpnUdp => "ovpnudp",
            TransportFamily::WireGuard => "wg",
        }
    }
}

impl ServerGroup {
    /// Servers of the given family
    pub fn family(&self, family: TransportFamily) -> &[Server] {
        match family {
            TransportFamily::IkeV2 => &self.ikev2,
            TransportFamily::Meta => &self.meta,
            TransportFamily::OpenVpnTcp => &self.ovpntcp,
            TransportFamily::OpenVpnUdp => &self.ovpnudp,
            TransportFamily::WireGuard => &self.wg,
        }
    }

    /// Mutable access to the servers of the given family
    pub fn family_mut(&mut self, family: TransportFamily) -> &mut Vec<Server> {
        match family {
            TransportFamily::IkeV2 => &mut self.ikev2,
            TransportFamily::Meta => &mut self.meta,
            TransportFamily::OpenVpnTcp => &mut self.ovpntcp,
            TransportFamily::OpenVpnUdp => &mut self.ovpnudp,
            TransportFamily::WireGuard => &mut self.wg,
        }
    }
}

impl Region {
    /// Servers of the probed family
    pub fn probed_servers(&self) -> &[Server] {
        self.servers.family(TransportFamily::PROBED)
    }

    /// Whether at least one server of the probed family is listed
    pub fn has_probed_servers(&self) -> bool {
        !self.probed_servers().is_empty()
    }

    /// Lowest measured latency among the probed family's servers
    pub fn best_latency(&self) -> Option<Duration> {
        self.probed_servers().iter().filter_map(|s| s.latency).min()
    }

    /// Clone of this region with the probed family replaced by `servers`
    pub fn with_probed_servers(&self, servers: Vec<Server>) -> Region {
        let mut region = self.clone();
        *region.servers.family_mut(TransportFamily::PROBED) = servers;
        region
    }
}

impl Server {
    /// Copy of this server annotated with a measured latency
    pub fn with_latency(&self, latency: Duration) -> Server {
        Server {
            latency: Some(latency),
            ..self.clone()
        }
    }
}

/// An explicit `null` decodes like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Latencies are stored as integer nanoseconds so the payload round-trips exactly
mod latency_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            // u64 nanoseconds cover ~584 years
            Some(d) => serializer.serialize_some(&(d.as_nanos() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "regions": [
            {
                "id": "swiss",
                "name": "Switzerland",
                "country": "CH",
                "auto_region": true,
                "dns": "swiss.privacy.network",
                "port_forward": true,
                "geo": false,
                "offline": false,
                "servers": {
                    "ikev2": [{"ip": "156.146.62.193", "cn": "zurich405"}],
                    "ovpnudp": [{"ip": "156.146.62.194", "cn": "zurich405"}],
                    "wg": [
                        {"ip": "212.102.37.2", "cn": "zurich406", "van": false},
                        {"ip": "212.102.37.3", "cn": "zurich407"}
                    ]
                }
            },
            {"id": "empty", "name": "Nowhere"}
        ]
    }"#;

    #[test]
    fn test_decode_catalog_envelope() {
        let envelope: CatalogEnvelope = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(envelope.regions.len(), 2);

        let swiss = &envelope.regions[0];
        assert_eq!(swiss.id, "swiss");
        assert!(swiss.auto_region);
        assert!(swiss.port_forward);
        assert_eq!(swiss.servers.ikev2.len(), 1);
        assert!(swiss.servers.meta.is_empty());
        assert_eq!(swiss.probed_servers().len(), 2);
        assert!(swiss.probed_servers().iter().all(|s| s.latency.is_none()));

        let empty = &envelope.regions[1];
        assert!(!empty.has_probed_servers());
        assert_eq!(empty.servers, ServerGroup::default());
    }

    #[test]
    fn test_best_latency() {
        let region = Region {
            id: "r".into(),
            name: "R".into(),
            servers: ServerGroup {
                wg: vec![
                    Server { ip: "10.0.0.1".into(), latency: Some(Duration::from_millis(30)), ..Default::default() },
                    Server { ip: "10.0.0.2".into(), latency: None, ..Default::default() },
                    Server { ip: "10.0.0.3".into(), latency: Some(Duration::from_millis(12)), ..Default::default() },
                ],
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(region.best_latency(), Some(Duration::from_millis(12)));
        assert_eq!(Region::default().best_latency(), None);
    }

    #[test]
    fn test_with_probed_servers_leaves_other_families() {
        let envelope: CatalogEnvelope = serde_json::from_str(SAMPLE).unwrap();
        let original = &envelope.regions[0];

        let measured = original.probed_servers()[0].with_latency(Duration::from_millis(7));
        let probed = original.with_probed_servers(vec![measured.clone()]);

        assert_eq!(probed.servers.wg, vec![measured]);
        assert_eq!(probed.servers.ikev2, original.servers.ikev2);
        assert_eq!(probed.servers.ovpnudp, original.servers.ovpnudp);
        // the source region is untouched
        assert_eq!(original.probed_servers().len(), 2);
    }

    #[test]
    fn test_latency_serialized_as_nanoseconds() {
        let server = Server {
            ip: "1.2.3.4".into(),
            cn: "cn".into(),
            van: false,
            latency: Some(Duration::new(1, 500)),
        };
        let json = serde_json::to_value(&server).unwrap();
        assert_eq!(json["latency"], serde_json::json!(1_000_000_500u64));

        let unmeasured = Server { latency: None, ..server };
        let json = serde_json::to_value(&unmeasured).unwrap();
        assert!(json.get("latency").is_none());
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let json = r#"{"regions": [
            {"id": "nil", "name": "Nil", "country": null, "servers": null},
            {"id": "nil_wg", "name": "Nil WG", "auto_region": null, "servers": {"wg": null, "ikev2": null}},
            {"id": "nil_cn", "name": "Nil CN", "servers": {"wg": [{"ip": "10.0.0.1", "cn": null, "van": null}]}}
        ]}"#;

        let envelope: CatalogEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.regions[0].servers, ServerGroup::default());
        assert_eq!(envelope.regions[0].country, "");
        assert!(!envelope.regions[1].auto_region);
        assert!(!envelope.regions[1].has_probed_servers());
        assert_eq!(envelope.regions[2].probed_servers()[0].cn, "");

        let envelope: CatalogEnvelope = serde_json::from_str(r#"{"regions": null}"#).unwrap();
        assert!(envelope.regions.is_empty());
    }

    #[test]
    fn test_compound_flags_serialize_in_camel_case() {
        let envelope: CatalogEnvelope = serde_json::from_str(SAMPLE).unwrap();
        let json = serde_json::to_value(&envelope.regions[0]).unwrap();

        assert_eq!(json["autoRegion"], serde_json::json!(true));
        assert_eq!(json["portForward"], serde_json::json!(true));
        assert!(json.get("auto_region").is_none());
        assert!(json.get("port_forward").is_none());

        // the camel case spelling reads back into the same fields
        let back: Region = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope.regions[0]);
    }

    #[test]
    fn test_transport_family_keys() {
        assert_eq!(TransportFamily::PROBED.as_str(), "wg");
        assert_eq!(TransportFamily::OpenVpnTcp.as_str(), "ovpntcp");
    }
}
