//! Downstream TLS transport sockets using envoy-types
//!
//! Resolved certificate material is always inline PEM (the secret store
//! already produced it), so the data sources here are inline strings rather
//! than file paths.

use envoy_types::pb::envoy::config::core::v3::{
    transport_socket::ConfigType as TransportSocketConfigType, DataSource, TransportSocket,
};
use envoy_types::pb::envoy::extensions::transport_sockets::quic::v3::QuicDownstreamTransport;
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, DownstreamTlsContext, TlsCertificate,
};
use envoy_types::pb::google::protobuf::Any as EnvoyAny;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::secrets::CertificateMaterial;

/// Logical representation of a chain's TLS server context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsContextConfig {
    /// PEM certificate chain
    pub certificate_chain: String,

    /// PEM private key
    pub private_key: String,
}

impl TlsContextConfig {
    pub fn from_material(material: &CertificateMaterial) -> Self {
        Self {
            certificate_chain: material.certificate_chain.clone(),
            private_key: material.private_key.clone(),
        }
    }

    fn downstream_context(&self) -> DownstreamTlsContext {
        let common = CommonTlsContext {
            tls_certificates: vec![TlsCertificate {
                certificate_chain: Some(inline_data_source(&self.certificate_chain)),
                private_key: Some(inline_data_source(&self.private_key)),
                ..Default::default()
            }],
            ..Default::default()
        };

        DownstreamTlsContext { common_tls_context: Some(common), ..Default::default() }
    }

    /// Build the TLS transport socket for a stream-based chain.
    pub fn to_envoy_transport_socket(&self) -> TransportSocket {
        let any = EnvoyAny {
            type_url:
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext"
                    .to_string(),
            value: self.downstream_context().encode_to_vec(),
        };

        TransportSocket {
            name: "envoy.transport_sockets.tls".to_string(),
            config_type: Some(TransportSocketConfigType::TypedConfig(any)),
        }
    }

    /// Build the QUIC transport socket for a datagram-based chain; TLS is
    /// part of the protocol itself there.
    pub fn to_envoy_quic_transport_socket(&self) -> TransportSocket {
        let quic = QuicDownstreamTransport {
            downstream_tls_context: Some(self.downstream_context()),
            ..Default::default()
        };

        let any = EnvoyAny {
            type_url:
                "type.googleapis.com/envoy.extensions.transport_sockets.quic.v3.QuicDownstreamTransport"
                    .to_string(),
            value: quic.encode_to_vec(),
        };

        TransportSocket {
            name: "envoy.transport_sockets.quic".to_string(),
            config_type: Some(TransportSocketConfigType::TypedConfig(any)),
        }
    }
}

fn inline_data_source(pem: &str) -> DataSource {
    DataSource {
        watched_directory: None,
        specifier: Some(
            envoy_types::pb::envoy::config::core::v3::data_source::Specifier::InlineString(
                pem.to_string(),
            ),
        ),
    }
}
