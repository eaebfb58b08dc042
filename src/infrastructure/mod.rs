pub mod http_price_oracle;
